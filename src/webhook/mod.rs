pub mod notifier;
pub mod signer;

pub use notifier::{WebhookEvent, WebhookKind, WebhookNotifier, WebhookStatus};
pub use signer::HmacSigner;
