pub mod audit;
pub mod booking_service;
pub mod cart_service;
pub mod checkout_service;
pub mod expiry_sweeper;
pub mod payment_oracle;
pub mod retry;
pub mod settlement;

pub use audit::AuditTrailService;
pub use booking_service::{BookingService, BookingSummary};
pub use cart_service::{CartService, CartView};
pub use checkout_service::{CheckoutService, MoneyMarketDetails};
pub use expiry_sweeper::ExpirySweeper;
pub use payment_oracle::{CardPaymentOracle, HttpCardOracle, SimulatedCardOracle};
pub use settlement::{PaymentSettlementService, SettledPayment};
