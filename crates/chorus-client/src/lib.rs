pub mod chan;
pub mod reddit;
pub mod sentiment;
pub mod toxicity;

pub use chan::ChanClient;
pub use reddit::{Credential, CredentialPool, RedditClient};
pub use sentiment::LexiconScorer;
pub use toxicity::HateSpeechClient;
