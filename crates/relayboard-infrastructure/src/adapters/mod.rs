//! Concrete implementations of the external-collaborator ports named in spec §6.

pub mod board_client;
pub mod directory_client;
pub mod embedding;
pub mod jira_client;
pub mod storage;
pub mod text_extractor;
pub mod webhook_verifier;

pub use board_client::ReqwestBoardClient;
pub use directory_client::ReqwestDirectoryClient;
pub use embedding::HttpEmbeddingService;
pub use jira_client::ReqwestJiraClient;
pub use storage::FsStorageAdapter;
pub use text_extractor::PlainTextExtractor;
pub use webhook_verifier::HmacWebhookVerifier;
