//! Business logic services for the Stock Ledger

pub mod category;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod product;
pub mod purchase_order;
pub mod stock_monitor;
pub mod supplier;

pub use category::CategoryService;
pub use inventory::InventoryService;
pub use notification::NotificationService;
pub use order::OrderService;
pub use product::ProductService;
pub use purchase_order::PurchaseOrderService;
pub use stock_monitor::{AlertStore, PgAlertStore, StockCheckReport, StockMonitor};
pub use supplier::SupplierService;
