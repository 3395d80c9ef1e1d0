mod helpers;

use helpers::*;
use sqlx::PgPool;
use ticketing_backend::auth::USER_ID_METADATA_KEY;
use ticketing_backend::grpc_service::proto::ticketing_service_server::TicketingService;
use ticketing_backend::grpc_service::proto::*;
use ticketing_backend::grpc_service::{TicketingGrpcService, ERROR_DETAIL_METADATA_KEY};
use tonic::{Code, Request};
use uuid::Uuid;

fn as_user<T>(user_id: Uuid, message: T) -> Request<T> {
    let mut request = Request::new(message);
    request.metadata_mut().insert(
        USER_ID_METADATA_KEY,
        user_id.to_string().parse().expect("valid metadata value"),
    );
    request
}

fn detail_of(status: &tonic::Status) -> serde_json::Value {
    let raw = status
        .metadata()
        .get_bin(ERROR_DETAIL_METADATA_KEY)
        .expect("detail metadata")
        .to_bytes()
        .expect("decodable detail");
    serde_json::from_slice(&raw).expect("json detail")
}

#[sqlx::test]
async fn test_card_flow_over_grpc(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixtures = TestFixtures::create(&db).await;
    let service = TicketingGrpcService::new(db.app.clone());
    let alice = fixtures.alice.id;

    let cart = service
        .add_to_cart(as_user(
            alice,
            AddToCartRequest {
                ticket_type_id: fixtures.general.id.to_string(),
                quantity: 2,
            },
        ))
        .await
        .unwrap()
        .into_inner()
        .cart
        .expect("cart returned");
    assert_eq!(cart.total_amount, "50.00");
    assert_eq!(cart.items.len(), 1);

    let checkout = service
        .checkout(as_user(
            alice,
            CheckoutRequest {
                booking_id: cart.booking_id.clone(),
                payment_method: "Card".to_string(),
            },
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(checkout.payment_method, "Card");
    assert!(checkout.reference_code.is_none());
    assert_eq!(checkout.payment_expires_at, 0);

    let card = valid_card();
    let result = service
        .pay_by_card(as_user(
            alice,
            CardPaymentRequest {
                payment_id: checkout.payment_id.clone(),
                card: Some(CardDetails {
                    cardholder_name: card.cardholder_name,
                    card_number: card.card_number,
                    expiry_date: card.expiry_date,
                    cvv: card.cvv,
                }),
            },
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(result.status, "Completed");
    assert_eq!(result.booking_id, cart.booking_id);
    assert!(result.paid_at > 0);

    let bookings = service
        .list_user_bookings(as_user(alice, ListBookingsRequest {}))
        .await
        .unwrap()
        .into_inner()
        .bookings;
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, "Confirmed");
    assert_eq!(
        bookings[0].payment.as_ref().map(|p| p.status.as_str()),
        Some("Completed")
    );

    let cancelled = service
        .cancel_booking(as_user(
            alice,
            CancelBookingRequest {
                booking_id: cart.booking_id.clone(),
            },
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(cancelled.status, "Cancelled");
    assert_eq!(db.ticket_type(fixtures.general.id).await.quantity_sold, 0);
}

#[sqlx::test]
async fn test_money_market_flow_over_grpc(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixtures = TestFixtures::create(&db).await;
    let service = TicketingGrpcService::new(db.app.clone());
    let bob = fixtures.bob.id;

    let cart = service
        .add_to_cart(as_user(
            bob,
            AddToCartRequest {
                ticket_type_id: fixtures.vip.id.to_string(),
                quantity: 1,
            },
        ))
        .await
        .unwrap()
        .into_inner()
        .cart
        .expect("cart returned");

    let checkout = service
        .checkout(as_user(
            bob,
            CheckoutRequest {
                booking_id: cart.booking_id,
                payment_method: "MoneyMarket".to_string(),
            },
        ))
        .await
        .unwrap()
        .into_inner();
    let code = checkout.reference_code.clone().expect("reference code");
    assert!(checkout.payment_expires_at > 0);

    let details = service
        .get_money_market_details(as_user(
            bob,
            MoneyMarketDetailsRequest {
                payment_id: checkout.payment_id.clone(),
            },
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(details.reference_code, code);
    assert_eq!(details.amount, "100.00");

    // The outlet confirms without a user identity
    let settled = service
        .confirm_by_reference_code(Request::new(ConfirmReferenceRequest {
            reference_code: code,
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(settled.status, "Completed");

    let status = service
        .get_payment_status(as_user(
            bob,
            PaymentStatusRequest {
                payment_id: checkout.payment_id,
            },
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(status.status, "Completed");
    assert_eq!(status.payment_method, "MoneyMarket");
}

#[sqlx::test]
async fn test_grpc_errors_carry_codes_and_detail(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let fixtures = TestFixtures::create(&db).await;
    let service = TicketingGrpcService::new(db.app.clone());

    let anonymous = service
        .get_cart(Request::new(GetCartRequest {}))
        .await
        .unwrap_err();
    assert_eq!(anonymous.code(), Code::Unauthenticated);

    let bad_id = service
        .add_to_cart(as_user(
            fixtures.alice.id,
            AddToCartRequest {
                ticket_type_id: "not-a-uuid".to_string(),
                quantity: 1,
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(bad_id.code(), Code::InvalidArgument);

    let oversold = service
        .add_to_cart(as_user(
            fixtures.alice.id,
            AddToCartRequest {
                ticket_type_id: fixtures.vip.id.to_string(),
                quantity: 5,
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(oversold.code(), Code::ResourceExhausted);
    let detail = detail_of(&oversold);
    assert_eq!(detail["ticket_type_name"], "VIP");
    assert_eq!(detail["requested"], 5);
    assert_eq!(detail["available"], 2);

    let bad_method = service
        .checkout(as_user(
            fixtures.alice.id,
            CheckoutRequest {
                booking_id: Uuid::new_v4().to_string(),
                payment_method: "Cash".to_string(),
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(bad_method.code(), Code::InvalidArgument);

    let empty_cart = service
        .get_cart(as_user(fixtures.alice.id, GetCartRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert!(empty_cart.cart.is_none());
}
