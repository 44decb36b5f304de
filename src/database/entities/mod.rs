pub mod connected_accounts;

pub use connected_accounts::ConnectedAccountInfo;
pub use connected_accounts::Entity as ConnectedAccounts;

// Type aliases
pub type ConnectedAccount = connected_accounts::Model;
