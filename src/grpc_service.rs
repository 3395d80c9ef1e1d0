//! gRPC service implementation for the ticketing backend
//!
//! This module implements the TicketingService handlers using tonic.
//! The proto definitions are compiled at build time via build.rs.

use crate::auth;
use crate::error::AppError;
use crate::models::{BookingItemDetail, CardDetails, Payment, PaymentMethod};
use crate::services::{BookingSummary, CartView, SettledPayment};
use crate::AppState;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tonic::metadata::MetadataValue;
use tonic::{Request, Response, Status};
use tracing::{error, info};
use uuid::Uuid;

// Include the generated proto code
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/ticketing.rs"));

    /// File descriptor set for gRPC reflection
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/ticketing_descriptor.bin"));
}

use proto::ticketing_service_server::{TicketingService, TicketingServiceServer};
use proto::{
    AddToCartRequest, BookingItemSummary, BookingResponse, CancelBookingRequest,
    CardPaymentRequest, Cart, CartItem, CartResponse, CheckoutRequest, CheckoutResponse,
    ConfirmReferenceRequest, GetCartRequest, ListBookingsRequest, ListBookingsResponse,
    MoneyMarketDetailsRequest, MoneyMarketDetailsResponse, PaymentResultResponse,
    PaymentStatusRequest, PaymentStatusResponse, PaymentSummary, RemoveFromCartRequest,
    RemoveFromCartResponse,
};

/// Binary metadata key carrying the JSON error detail
pub const ERROR_DETAIL_METADATA_KEY: &str = "x-error-detail-bin";

/// gRPC service implementation
pub struct TicketingGrpcService {
    app_state: Arc<AppState>,
}

impl TicketingGrpcService {
    /// Create a new gRPC service
    pub fn new(app_state: Arc<AppState>) -> Self {
        Self { app_state }
    }

    /// Create a tonic server for this service
    pub fn into_server(self) -> TicketingServiceServer<Self> {
        TicketingServiceServer::new(self)
    }

    /// Convert AppError to tonic Status, attaching the JSON detail
    pub fn to_status(err: AppError) -> Status {
        let mut status = match &err {
            AppError::NotFound(msg) => Status::not_found(msg.clone()),
            AppError::AuthenticationRequired(msg) => Status::unauthenticated(msg.clone()),
            AppError::Validation(_) | AppError::InvalidUuid(_) => {
                Status::invalid_argument(err.to_string())
            }
            AppError::InvalidState(_)
            | AppError::Expired { .. }
            | AppError::PaymentDeclined { .. } => Status::failed_precondition(err.to_string()),
            AppError::InsufficientInventory { .. } => Status::resource_exhausted(err.to_string()),
            AppError::TransientConflict(_) => Status::aborted(err.to_string()),
            AppError::ExternalService(_) => Status::unavailable(err.to_string()),
            AppError::Database(_) | AppError::Sqlx(_) => {
                error!("Database error: {}", err);
                Status::internal("Database error")
            }
            _ => {
                error!("Internal error: {}", err);
                Status::internal("Internal server error")
            }
        };

        if let Ok(detail) = serde_json::to_vec(&err.detail()) {
            status
                .metadata_mut()
                .insert_bin(ERROR_DETAIL_METADATA_KEY, MetadataValue::from_bytes(&detail));
        }

        status
    }

    /// Parse UUID from string
    fn parse_uuid(s: &str, field_name: &str) -> Result<Uuid, Status> {
        Uuid::parse_str(s)
            .map_err(|_| Status::invalid_argument(format!("Invalid {}: {}", field_name, s)))
    }

    fn caller<T>(request: &Request<T>) -> Result<Uuid, Status> {
        auth::authenticated_user(request.metadata()).map_err(Self::to_status)
    }
}

fn unix(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map(|t| t.timestamp()).unwrap_or(0)
}

fn cart_to_proto(view: CartView) -> Cart {
    Cart {
        booking_id: view.booking.id.to_string(),
        event_id: view.booking.event_id.to_string(),
        total_amount: view.booking.total_amount.to_string(),
        expires_at: view.booking.expires_at.timestamp(),
        items: view
            .items
            .into_iter()
            .map(|item| CartItem {
                item_id: item.id.to_string(),
                ticket_type_id: item.ticket_type_id.to_string(),
                line_total: item.line_total().to_string(),
                event_title: item.event_title,
                ticket_type_name: item.ticket_type_name,
                quantity: item.quantity,
                unit_price: item.unit_price.to_string(),
            })
            .collect(),
    }
}

fn item_summary(item: BookingItemDetail) -> BookingItemSummary {
    BookingItemSummary {
        line_total: item.line_total().to_string(),
        event_title: item.event_title,
        event_start: item.event_start.timestamp(),
        ticket_type_name: item.ticket_type_name,
        quantity: item.quantity,
        unit_price: item.unit_price.to_string(),
    }
}

fn payment_summary(payment: &Payment) -> PaymentSummary {
    PaymentSummary {
        payment_id: payment.id.to_string(),
        payment_method: payment.payment_method.label().to_string(),
        status: payment.status.label().to_string(),
        reference_code: payment.reference_code.clone(),
        paid_at: unix(payment.paid_at),
    }
}

fn booking_to_proto(summary: BookingSummary) -> BookingResponse {
    BookingResponse {
        booking_id: summary.booking.id.to_string(),
        status: summary.booking.status.label().to_string(),
        total_amount: summary.booking.total_amount.to_string(),
        booked_at: summary.booking.booked_at.timestamp(),
        expires_at: summary.booking.expires_at.timestamp(),
        items: summary.items.into_iter().map(item_summary).collect(),
        payment: summary.payment.as_ref().map(payment_summary),
    }
}

fn settled_to_proto(settled: SettledPayment) -> PaymentResultResponse {
    PaymentResultResponse {
        payment_id: settled.payment.id.to_string(),
        booking_id: settled.booking.id.to_string(),
        status: settled.payment.status.label().to_string(),
        paid_at: unix(settled.payment.paid_at),
    }
}

#[tonic::async_trait]
impl TicketingService for TicketingGrpcService {
    async fn add_to_cart(
        &self,
        request: Request<AddToCartRequest>,
    ) -> Result<Response<CartResponse>, Status> {
        let user_id = Self::caller(&request)?;
        let req = request.into_inner();
        let ticket_type_id = Self::parse_uuid(&req.ticket_type_id, "ticket_type_id")?;

        let view = self
            .app_state
            .cart_service
            .add_to_cart(user_id, ticket_type_id, req.quantity)
            .await
            .map_err(Self::to_status)?;

        Ok(Response::new(CartResponse {
            cart: Some(cart_to_proto(view)),
        }))
    }

    async fn get_cart(
        &self,
        request: Request<GetCartRequest>,
    ) -> Result<Response<CartResponse>, Status> {
        let user_id = Self::caller(&request)?;

        let view = self
            .app_state
            .cart_service
            .get_cart(user_id)
            .await
            .map_err(Self::to_status)?;

        Ok(Response::new(CartResponse {
            cart: view.map(cart_to_proto),
        }))
    }

    async fn remove_from_cart(
        &self,
        request: Request<RemoveFromCartRequest>,
    ) -> Result<Response<RemoveFromCartResponse>, Status> {
        let user_id = Self::caller(&request)?;
        let req = request.into_inner();
        let booking_id = Self::parse_uuid(&req.booking_id, "booking_id")?;

        self.app_state
            .cart_service
            .remove_from_cart(user_id, booking_id)
            .await
            .map_err(Self::to_status)?;

        Ok(Response::new(RemoveFromCartResponse {
            success: true,
            booking_id: booking_id.to_string(),
        }))
    }

    async fn checkout(
        &self,
        request: Request<CheckoutRequest>,
    ) -> Result<Response<CheckoutResponse>, Status> {
        let user_id = Self::caller(&request)?;
        let req = request.into_inner();
        let booking_id = Self::parse_uuid(&req.booking_id, "booking_id")?;
        let method: PaymentMethod = req.payment_method.parse().map_err(|_| {
            Status::invalid_argument(format!(
                "Invalid payment_method: {} (expected Card or MoneyMarket)",
                req.payment_method
            ))
        })?;

        let payment = self
            .app_state
            .checkout_service
            .initiate_checkout(user_id, booking_id, method)
            .await
            .map_err(Self::to_status)?;

        Ok(Response::new(CheckoutResponse {
            payment_id: payment.id.to_string(),
            amount: payment.amount.to_string(),
            payment_method: payment.payment_method.label().to_string(),
            reference_code: payment.reference_code.clone(),
            payment_expires_at: unix(payment.expires_at),
        }))
    }

    async fn get_money_market_details(
        &self,
        request: Request<MoneyMarketDetailsRequest>,
    ) -> Result<Response<MoneyMarketDetailsResponse>, Status> {
        let user_id = Self::caller(&request)?;
        let req = request.into_inner();
        let payment_id = Self::parse_uuid(&req.payment_id, "payment_id")?;

        let details = self
            .app_state
            .checkout_service
            .money_market_details(user_id, payment_id)
            .await
            .map_err(Self::to_status)?;

        Ok(Response::new(MoneyMarketDetailsResponse {
            payment_id: details.payment_id.to_string(),
            reference_code: details.reference_code,
            amount: details.amount.to_string(),
            qr_code_data: details.qr_code_data,
            expires_at: details.expires_at.timestamp(),
            instructions: details.instructions,
        }))
    }

    async fn pay_by_card(
        &self,
        request: Request<CardPaymentRequest>,
    ) -> Result<Response<PaymentResultResponse>, Status> {
        let user_id = Self::caller(&request)?;
        let req = request.into_inner();
        let payment_id = Self::parse_uuid(&req.payment_id, "payment_id")?;
        let card = req
            .card
            .map(|c| CardDetails {
                cardholder_name: c.cardholder_name,
                card_number: c.card_number,
                expiry_date: c.expiry_date,
                cvv: c.cvv,
            })
            .ok_or_else(|| Status::invalid_argument("Card details are required"))?;

        let settled = self
            .app_state
            .settlement_service
            .confirm_by_card_details(user_id, payment_id, &card)
            .await
            .map_err(Self::to_status)?;

        info!("Card payment {} settled", payment_id);
        Ok(Response::new(settled_to_proto(settled)))
    }

    async fn confirm_by_reference_code(
        &self,
        request: Request<ConfirmReferenceRequest>,
    ) -> Result<Response<PaymentResultResponse>, Status> {
        let req = request.into_inner();

        let settled = self
            .app_state
            .settlement_service
            .confirm_by_reference_code(&req.reference_code)
            .await
            .map_err(Self::to_status)?;

        info!("Reference code {} settled", req.reference_code);
        Ok(Response::new(settled_to_proto(settled)))
    }

    async fn get_payment_status(
        &self,
        request: Request<PaymentStatusRequest>,
    ) -> Result<Response<PaymentStatusResponse>, Status> {
        let user_id = Self::caller(&request)?;
        let req = request.into_inner();
        let payment_id = Self::parse_uuid(&req.payment_id, "payment_id")?;

        let payment = self
            .app_state
            .settlement_service
            .payment_status(user_id, payment_id)
            .await
            .map_err(Self::to_status)?;

        Ok(Response::new(PaymentStatusResponse {
            payment_id: payment.id.to_string(),
            booking_id: payment.booking_id.to_string(),
            status: payment.status.label().to_string(),
            amount: payment.amount.to_string(),
            payment_method: payment.payment_method.label().to_string(),
            reference_code: payment.reference_code.clone(),
            paid_at: unix(payment.paid_at),
        }))
    }

    async fn list_user_bookings(
        &self,
        request: Request<ListBookingsRequest>,
    ) -> Result<Response<ListBookingsResponse>, Status> {
        let user_id = Self::caller(&request)?;

        let bookings = self
            .app_state
            .booking_service
            .list_user_bookings(user_id)
            .await
            .map_err(Self::to_status)?;

        Ok(Response::new(ListBookingsResponse {
            bookings: bookings.into_iter().map(booking_to_proto).collect(),
        }))
    }

    async fn cancel_booking(
        &self,
        request: Request<CancelBookingRequest>,
    ) -> Result<Response<BookingResponse>, Status> {
        let actor_id = Self::caller(&request)?;
        let req = request.into_inner();
        let booking_id = Self::parse_uuid(&req.booking_id, "booking_id")?;

        let booking = self
            .app_state
            .booking_service
            .cancel_booking(actor_id, booking_id)
            .await
            .map_err(Self::to_status)?;

        let items = self
            .app_state
            .booking_repo
            .item_details(&[booking_id])
            .await
            .map_err(|e| Self::to_status(e.into()))?;
        let payment = self
            .app_state
            .payment_repo
            .find_by_booking(booking_id)
            .await
            .map_err(|e| Self::to_status(e.into()))?;

        Ok(Response::new(booking_to_proto(BookingSummary {
            booking,
            items,
            payment,
        })))
    }
}
