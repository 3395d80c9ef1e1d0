pub mod booking_repository;
pub mod event_repository;
pub mod inventory_repository;
pub mod payment_repository;
pub mod user_repository;

// Re-export all repositories for convenient access
pub use booking_repository::{BookingRepository, ExpiredCounts};
pub use event_repository::EventRepository;
pub use inventory_repository::{InventoryRepository, LedgerLine};
pub use payment_repository::PaymentRepository;
pub use user_repository::UserRepository;
