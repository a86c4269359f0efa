//! Scripted gateway adapter for tests
//!
//! Implements [`GatewayClient`] with fully deterministic behavior: each test
//! scripts the outcome of the next create call and the reported state of any
//! intent, and can assert afterwards exactly how many gateway calls were made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use core_kernel::Money;
use domain_invoicing::{GatewayClient, GatewayError, GatewayIntent, IntentState, SignatureError};

/// Shared secret used by the scripted gateway's signature check
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_0123456789abcdef";

/// Computes the hex HMAC-SHA256 signature a gateway would send for `payload`
pub fn sign_webhook(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// What the next `create_intent` call should do
#[derive(Debug, Clone)]
enum CreateScript {
    Succeed,
    Fail(&'static str),
    Reject(&'static str),
}

/// Deterministic in-memory gateway
///
/// By default every create call succeeds and returns a fresh intent in
/// `requires_confirmation`; tests override per-call behavior up front.
#[derive(Default)]
pub struct ScriptedGateway {
    intent_seq: AtomicU64,
    create_calls: AtomicU32,
    confirm_calls: AtomicU32,
    status_calls: AtomicU32,
    scripts: Mutex<Vec<CreateScript>>,
    states: Mutex<HashMap<String, IntentState>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a create-call failure (transient transport error)
    pub fn script_create_failure(&self, message: &'static str) {
        self.scripts
            .lock()
            .unwrap()
            .push(CreateScript::Fail(message));
    }

    /// Queues a create-call rejection (definitive)
    pub fn script_create_rejection(&self, message: &'static str) {
        self.scripts
            .lock()
            .unwrap()
            .push(CreateScript::Reject(message));
    }

    /// Forces the state reported for a known intent
    pub fn set_intent_state(&self, intent_id: &str, state: IntentState) {
        self.states
            .lock()
            .unwrap()
            .insert(intent_id.to_string(), state);
    }

    /// Number of `create_intent` calls made so far
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_intent_status` calls made so far
    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Number of `confirm_intent` calls made so far
    pub fn confirm_calls(&self) -> u32 {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> CreateScript {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            CreateScript::Succeed
        } else {
            scripts.remove(0)
        }
    }

    fn state_of(&self, intent_id: &str) -> Result<IntentState, GatewayError> {
        self.states
            .lock()
            .unwrap()
            .get(intent_id)
            .copied()
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))
    }
}

#[async_trait]
impl GatewayClient for ScriptedGateway {
    async fn create_intent(
        &self,
        _amount: Money,
        _idempotency_key: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_script() {
            CreateScript::Succeed => {
                let seq = self.intent_seq.fetch_add(1, Ordering::SeqCst) + 1;
                let intent_id = format!("pi_test_{seq:06}");
                self.states
                    .lock()
                    .unwrap()
                    .insert(intent_id.clone(), IntentState::RequiresConfirmation);
                Ok(GatewayIntent {
                    client_secret: format!("{intent_id}_secret"),
                    intent_id,
                    state: IntentState::RequiresConfirmation,
                })
            }
            CreateScript::Fail(message) => Err(GatewayError::Transport(message.to_string())),
            CreateScript::Reject(message) => Err(GatewayError::Rejected(message.to_string())),
        }
    }

    async fn confirm_intent(&self, intent_id: &str) -> Result<IntentState, GatewayError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        self.state_of(intent_id)
    }

    async fn get_intent_status(&self, intent_id: &str) -> Result<IntentState, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.state_of(intent_id)
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError> {
        let expected = sign_webhook(TEST_WEBHOOK_SECRET, payload);
        if expected == signature {
            Ok(())
        } else {
            Err(SignatureError("signature mismatch".to_string()))
        }
    }
}
