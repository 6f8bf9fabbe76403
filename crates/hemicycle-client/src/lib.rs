pub mod fetcher;
pub mod notifier;

pub use fetcher::ReqwestFetcher;
pub use notifier::WebhookNotifier;
