//! Payload classification and redemption

use log::{debug, info, warn};
use regex::Regex;
use std::sync::Arc;

use super::outcome::ScanOutcome;
use super::store::{CodeStore, Redemption};
use crate::assets::SCAN_PATH;

/// Canonical scan url for a code id: `<origin>/scan/<id>`
pub fn scan_url(origin: &str, code_id: &str) -> String {
    format!("{}/{}/{}", origin.trim_end_matches('/'), SCAN_PATH, code_id)
}

/// Whether a payload is one of this system's code urls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    OwnCode { code_id: String },
    External,
}

impl Classification {
    pub fn is_own_code(&self) -> bool {
        matches!(self, Classification::OwnCode { .. })
    }

    pub fn code_id(&self) -> Option<&str> {
        match self {
            Classification::OwnCode { code_id } => Some(code_id),
            Classification::External => None,
        }
    }
}

/// Turns decoded payloads into classified outcomes via the code store
///
/// Each `redeem` issues exactly one store call and never retries; the store
/// is the serialization point between concurrent redemptions.
pub struct RedemptionCoordinator {
    store: Arc<dyn CodeStore>,
    origin: String,
    pattern: Regex,
}

impl RedemptionCoordinator {
    /// Create a coordinator recognising `<origin>/scan/<id>` payloads
    pub fn new(store: Arc<dyn CodeStore>, origin: &str) -> Result<Self, regex::Error> {
        let origin = origin.trim_end_matches('/').to_string();
        let pattern = Regex::new(&format!(
            r"^{}/{}/([a-f0-9-]+)(?:[/?#].*)?$",
            regex::escape(&origin),
            SCAN_PATH
        ))?;

        Ok(Self {
            store,
            origin,
            pattern,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn store(&self) -> &Arc<dyn CodeStore> {
        &self.store
    }

    pub fn scan_url(&self, code_id: &str) -> String {
        scan_url(&self.origin, code_id)
    }

    /// Match a payload against the code-url pattern
    pub fn classify(&self, payload: &str) -> Classification {
        match self.pattern.captures(payload.trim()) {
            Some(caps) => Classification::OwnCode {
                code_id: caps[1].to_string(),
            },
            None => Classification::External,
        }
    }

    /// Redeem a code id through the store's atomic primitive
    pub async fn redeem(&self, code_id: &str) -> ScanOutcome {
        match self.store.redeem_if_unredeemed(code_id).await {
            Ok(Redemption::NotFound) => {
                info!("Redemption: code {} not found", code_id);
                ScanOutcome::NotFound
            }
            Ok(Redemption::AlreadyRedeemed { at }) => {
                info!("Redemption: code {} already redeemed at {}", code_id, at);
                ScanOutcome::AlreadyRedeemed(at)
            }
            Ok(Redemption::Redeemed { at }) => {
                info!("Redemption: code {} redeemed for the first time", code_id);
                ScanOutcome::FirstRedemption(at)
            }
            Err(e) => {
                warn!("Redemption: store failure for {}: {}", code_id, e);
                ScanOutcome::Failure(e.to_string())
            }
        }
    }

    /// Classify a payload and redeem it if it is one of ours.
    /// External payloads never reach the store.
    pub async fn process(&self, payload: &str) -> ScanOutcome {
        match self.classify(payload) {
            Classification::OwnCode { code_id } => self.redeem(&code_id).await,
            Classification::External => {
                debug!("Redemption: external payload ({} bytes)", payload.len());
                ScanOutcome::ExternalPayload(payload.to_string())
            }
        }
    }
}
