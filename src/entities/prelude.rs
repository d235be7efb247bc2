pub use super::listings::Entity as Listings;
pub use super::order_audit_log::Entity as OrderAuditLog;
pub use super::order_contents::Entity as OrderContents;
pub use super::orders::Entity as Orders;
pub use super::transactions::Entity as Transactions;
pub use super::users::Entity as Users;
pub use super::wallets::Entity as Wallets;
pub use super::withdrawal_requests::Entity as WithdrawalRequests;
