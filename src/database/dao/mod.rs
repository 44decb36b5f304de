pub mod connected_accounts;

pub use connected_accounts::ConnectedAccountsDao;
