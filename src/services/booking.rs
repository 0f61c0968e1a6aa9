//! Booking lifecycle.
//!
//! Every write that depends on a prior read (slot check then insert,
//! status check then update) happens inside one SQLite transaction on the
//! shared connection, and the live-slot unique index backs the check up.
//! Status writes are compare-and-set on the expected prior status.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, Party, ProviderStats};
use crate::errors::{is_constraint_violation, AppError, AppResult};
use crate::models::{
    Booking, BookingStatus, BookingView, Page, PageRequest, PartySummary, PaymentMethod,
    Principal,
};
use crate::services::auth::{require_provider, require_user};
use crate::services::input::{present, require_fields, Numeric};

const BOOKING_NOT_FOUND: &str = "Booking not found";
const SLOT_TAKEN: &str = "Service provider is already booked for this time slot";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    #[serde(alias = "providerId")]
    pub service_provider_id: Option<String>,
    pub service_type: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub total_amount: Option<Numeric>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

impl ListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingList {
    pub bookings: Vec<BookingView>,
    pub pagination: Page,
}

#[derive(Debug, Serialize)]
pub struct PendingRequests {
    pub requests: Vec<BookingView>,
}

/// Booking date as sent by the client: `YYYY-MM-DD`, or a full RFC 3339
/// timestamp of which only the date part counts.
fn parse_booking_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| AppError::validation(format!("Invalid booking date: {raw}")))
}

fn slot_conflict_or_internal(e: anyhow::Error) -> AppError {
    if is_constraint_violation(&e) {
        AppError::SlotConflict(SLOT_TAKEN.to_string())
    } else {
        AppError::Internal(e)
    }
}

fn summarize_client(conn: &Connection, id: &str) -> AppResult<Option<PartySummary>> {
    Ok(queries::get_user(conn, id)?.map(|u| PartySummary {
        id: u.id,
        name: u.name,
        email: u.email,
        image: u.image,
        category: None,
    }))
}

fn summarize_provider(conn: &Connection, id: &str) -> AppResult<Option<PartySummary>> {
    Ok(queries::get_provider(conn, id)?.map(|p| PartySummary {
        id: p.id,
        name: p.name,
        email: p.email,
        image: p.image,
        category: Some(p.category),
    }))
}

fn view(conn: &Connection, booking: Booking) -> AppResult<BookingView> {
    let client = summarize_client(conn, &booking.client_id)?;
    let service_provider = summarize_provider(conn, &booking.provider_id)?;
    Ok(BookingView {
        booking,
        client,
        service_provider,
    })
}

/// Joins party summaries for a page of bookings, looking each party up once.
fn views(conn: &Connection, bookings: Vec<Booking>) -> AppResult<Vec<BookingView>> {
    let mut clients: HashMap<String, Option<PartySummary>> = HashMap::new();
    let mut providers: HashMap<String, Option<PartySummary>> = HashMap::new();
    let mut out = Vec::with_capacity(bookings.len());

    for booking in bookings {
        if !clients.contains_key(&booking.client_id) {
            let summary = summarize_client(conn, &booking.client_id)?;
            clients.insert(booking.client_id.clone(), summary);
        }
        if !providers.contains_key(&booking.provider_id) {
            let summary = summarize_provider(conn, &booking.provider_id)?;
            providers.insert(booking.provider_id.clone(), summary);
        }
        out.push(BookingView {
            client: clients.get(&booking.client_id).cloned().flatten(),
            service_provider: providers.get(&booking.provider_id).cloned().flatten(),
            booking,
        });
    }
    Ok(out)
}

pub fn create(
    conn: &mut Connection,
    principal: &Principal,
    input: &NewBooking,
    today: NaiveDate,
) -> AppResult<BookingView> {
    require_user(principal, "create bookings")?;

    let provider_id = present(&input.service_provider_id);
    let service_type = present(&input.service_type);
    let date_raw = present(&input.date);
    let time = present(&input.time);
    let location = present(&input.location);
    let payment_raw = present(&input.payment_method);

    require_fields(&[
        ("serviceProviderId", provider_id.is_some()),
        ("serviceType", service_type.is_some()),
        ("date", date_raw.is_some()),
        ("time", time.is_some()),
        ("location", location.is_some()),
        ("totalAmount", input.total_amount.is_some()),
        ("paymentMethod", payment_raw.is_some()),
    ])?;
    let (
        Some(provider_id),
        Some(service_type),
        Some(date_raw),
        Some(time),
        Some(location),
        Some(payment_raw),
    ) = (provider_id, service_type, date_raw, time, location, payment_raw)
    else {
        return Err(AppError::validation("All required fields must be provided"));
    };

    let date = parse_booking_date(date_raw)?;
    if date < today {
        return Err(AppError::validation("Booking date cannot be in the past"));
    }

    let total_amount = input
        .total_amount
        .as_ref()
        .and_then(Numeric::as_f64)
        .filter(|a| *a > 0.0)
        .ok_or_else(|| AppError::validation("Total amount must be greater than 0"))?;

    let payment_method = PaymentMethod::parse(payment_raw).ok_or_else(|| {
        AppError::validation(format!("Unsupported payment method: {payment_raw}"))
    })?;

    let tx = conn.transaction()?;

    let provider = queries::get_provider(&tx, provider_id)?
        .ok_or_else(|| AppError::not_found("Service provider not found"))?;
    if !provider.status.is_available() {
        return Err(AppError::validation("Service provider is not available"));
    }

    if let Some(existing) = queries::find_live_booking_for_slot(&tx, provider_id, &date, time)? {
        tracing::info!(
            provider_id = %provider_id,
            existing_id = %existing.id,
            "slot already held"
        );
        return Err(AppError::SlotConflict(SLOT_TAKEN.to_string()));
    }

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        client_id: principal.id().to_string(),
        provider_id: provider.id.clone(),
        service_type: service_type.to_string(),
        date,
        time: time.to_string(),
        location: location.to_string(),
        description: present(&input.description).map(str::to_string),
        total_amount,
        payment_method,
        status: BookingStatus::Pending,
        rejection_reason: None,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
    };

    queries::insert_booking(&tx, &booking).map_err(slot_conflict_or_internal)?;
    queries::increment_user_bookings(&tx, &booking.client_id)?;
    queries::increment_provider_bookings(&tx, &booking.provider_id)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        client_id = %booking.client_id,
        provider_id = %booking.provider_id,
        date = %booking.date,
        time = %booking.time,
        "booking created"
    );

    view(conn, booking)
}

fn load(conn: &Connection, id: &str) -> AppResult<Booking> {
    queries::get_booking(conn, id)?.ok_or_else(|| AppError::not_found(BOOKING_NOT_FOUND))
}

/// Authorization first, then the state precondition.
fn load_for_provider_action(
    conn: &Connection,
    id: &str,
    principal: &Principal,
    verb: &str,
) -> AppResult<Booking> {
    let booking = load(conn, id)?;
    if booking.provider_id != principal.id() || principal.as_provider().is_none() {
        return Err(AppError::forbidden(format!(
            "Access denied. Only the assigned service provider can {verb} bookings."
        )));
    }
    Ok(booking)
}

fn ensure_transition(booking: &Booking, to: BookingStatus, message: &str) -> AppResult<()> {
    if booking.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(message.to_string()))
    }
}

/// Writes the status change, failing if someone else moved the booking
/// since it was read.
fn apply_transition(
    conn: &Connection,
    booking: &Booking,
    to: BookingStatus,
    rejection_reason: Option<&str>,
    cancellation_reason: Option<&str>,
    now: &NaiveDateTime,
) -> AppResult<()> {
    let applied = queries::transition_booking(
        conn,
        &booking.id,
        booking.status,
        to,
        rejection_reason,
        cancellation_reason,
        now,
    )?;
    if !applied {
        return Err(AppError::InvalidTransition(format!(
            "Booking is no longer {}",
            booking.status.as_str()
        )));
    }
    tracing::info!(
        booking_id = %booking.id,
        from = booking.status.as_str(),
        to = to.as_str(),
        "booking status changed"
    );
    Ok(())
}

pub fn accept(conn: &mut Connection, id: &str, principal: &Principal) -> AppResult<BookingView> {
    let tx = conn.transaction()?;
    let booking = load_for_provider_action(&tx, id, principal, "accept")?;
    ensure_transition(&booking, BookingStatus::Accepted, "This booking cannot be accepted")?;

    if queries::find_other_accepted_booking(
        &tx,
        &booking.provider_id,
        &booking.date,
        &booking.time,
        &booking.id,
    )?
    .is_some()
    {
        return Err(AppError::SlotConflict(
            "You already have an accepted booking for this time slot".to_string(),
        ));
    }

    apply_transition(&tx, &booking, BookingStatus::Accepted, None, None, &Utc::now().naive_utc())?;
    tx.commit()?;
    view(conn, load(conn, id)?)
}

pub fn reject(
    conn: &mut Connection,
    id: &str,
    principal: &Principal,
    reason: Option<&str>,
) -> AppResult<BookingView> {
    let tx = conn.transaction()?;
    let booking = load_for_provider_action(&tx, id, principal, "reject")?;
    ensure_transition(&booking, BookingStatus::Rejected, "This booking cannot be rejected")?;
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    apply_transition(&tx, &booking, BookingStatus::Rejected, reason, None, &Utc::now().naive_utc())?;
    tx.commit()?;
    view(conn, load(conn, id)?)
}

pub fn complete(conn: &mut Connection, id: &str, principal: &Principal) -> AppResult<BookingView> {
    let tx = conn.transaction()?;
    let booking = load_for_provider_action(&tx, id, principal, "complete")?;
    ensure_transition(
        &booking,
        BookingStatus::Completed,
        "Only accepted bookings can be completed",
    )?;
    apply_transition(&tx, &booking, BookingStatus::Completed, None, None, &Utc::now().naive_utc())?;
    tx.commit()?;
    view(conn, load(conn, id)?)
}

/// Either party may cancel while the booking is still live.
pub fn cancel(
    conn: &mut Connection,
    id: &str,
    principal: &Principal,
    reason: Option<&str>,
) -> AppResult<BookingView> {
    let tx = conn.transaction()?;
    let booking = load(&tx, id)?;
    if !booking.involves(principal.id()) {
        return Err(AppError::forbidden(
            "Access denied. Only the client or service provider can cancel bookings.",
        ));
    }
    ensure_transition(&booking, BookingStatus::Cancelled, "This booking cannot be cancelled")?;
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    apply_transition(&tx, &booking, BookingStatus::Cancelled, None, reason, &Utc::now().naive_utc())?;
    tx.commit()?;
    view(conn, load(conn, id)?)
}

pub fn get(conn: &Connection, id: &str, principal: &Principal) -> AppResult<BookingView> {
    let booking = load(conn, id)?;
    if !booking.involves(principal.id()) {
        return Err(AppError::forbidden(
            "Access denied. You are not authorized to view this booking.",
        ));
    }
    view(conn, booking)
}

fn parse_status_filter(status: &Option<String>) -> AppResult<Option<BookingStatus>> {
    match present(status) {
        None => Ok(None),
        Some(s) => BookingStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("Unknown booking status: {s}"))),
    }
}

fn list_for(conn: &Connection, party: Party<'_>, query: &ListQuery) -> AppResult<BookingList> {
    let status = parse_status_filter(&query.status)?;
    let page = query.page_request();
    let bookings = queries::list_bookings(conn, party, status, page.limit(), page.offset())?;
    let total = queries::count_bookings(conn, party, status)?;
    Ok(BookingList {
        bookings: views(conn, bookings)?,
        pagination: Page::new(&page, total),
    })
}

pub fn list_for_client(
    conn: &Connection,
    principal: &Principal,
    query: &ListQuery,
) -> AppResult<BookingList> {
    require_user(principal, "view client bookings")?;
    list_for(conn, Party::Client(principal.id()), query)
}

pub fn list_for_provider(
    conn: &Connection,
    principal: &Principal,
    query: &ListQuery,
) -> AppResult<BookingList> {
    require_provider(principal, "view bookings")?;
    list_for(conn, Party::Provider(principal.id()), query)
}

/// Every pending request addressed to the provider, newest first.
pub fn pending_requests(conn: &Connection, principal: &Principal) -> AppResult<PendingRequests> {
    require_provider(principal, "view booking requests")?;
    let party = Party::Provider(principal.id());
    let total = queries::count_bookings(conn, party, Some(BookingStatus::Pending))?;
    let limit = u32::try_from(total).unwrap_or(u32::MAX);
    let bookings =
        queries::list_bookings(conn, party, Some(BookingStatus::Pending), limit, 0)?;
    Ok(PendingRequests {
        requests: views(conn, bookings)?,
    })
}

pub fn provider_stats(
    conn: &Connection,
    principal: &Principal,
    today: NaiveDate,
) -> AppResult<ProviderStats> {
    require_provider(principal, "view booking statistics")?;
    Ok(queries::get_provider_stats(conn, principal.id(), &today)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Category, Provider, ProviderStatus, User};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("Client {id}"),
            email: format!("{id}@example.com"),
            phone: "9000000001".to_string(),
            password_hash: "hash".to_string(),
            image: None,
            is_verified: false,
            total_bookings: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn provider(id: &str, status: ProviderStatus) -> Provider {
        Provider {
            id: id.to_string(),
            name: format!("Provider {id}"),
            email: format!("{id}@example.com"),
            phone: "9000000002".to_string(),
            password_hash: "hash".to_string(),
            category: Category::Plumber,
            experience: 5,
            price: 45.0,
            status,
            image: None,
            rating: 0.0,
            reviews: vec![],
            availability: vec![],
            is_verified: false,
            total_bookings: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    struct Fixture {
        conn: Connection,
        client: Principal,
        other_client: Principal,
        provider: Principal,
        other_provider: Principal,
    }

    fn setup() -> Fixture {
        let conn = db::init_db(":memory:").unwrap();
        let (c1, c2) = (user("c1"), user("c2"));
        let (p1, p2) = (
            provider("p1", ProviderStatus::Online),
            provider("p2", ProviderStatus::Online),
        );
        queries::insert_user(&conn, &c1).unwrap();
        queries::insert_user(&conn, &c2).unwrap();
        queries::insert_provider(&conn, &p1).unwrap();
        queries::insert_provider(&conn, &p2).unwrap();
        queries::insert_provider(&conn, &provider("p3", ProviderStatus::Offline)).unwrap();
        Fixture {
            conn,
            client: Principal::User(c1),
            other_client: Principal::User(c2),
            provider: Principal::Provider(p1),
            other_provider: Principal::Provider(p2),
        }
    }

    fn request(provider_id: &str, date: &str, time: &str) -> NewBooking {
        NewBooking {
            service_provider_id: Some(provider_id.into()),
            service_type: Some("Pipe repair".into()),
            date: Some(date.into()),
            time: Some(time.into()),
            location: Some("12 Park Street".into()),
            description: None,
            total_amount: Some(450.0.into()),
            payment_method: Some("upi".into()),
        }
    }

    fn book(f: &mut Fixture, time: &str) -> String {
        create(&mut f.conn, &f.client, &request("p1", "2099-01-01", time), today())
            .unwrap()
            .booking
            .id
    }

    #[test]
    fn test_create_is_pending_with_parties_joined() {
        let mut f = setup();
        let view =
            create(&mut f.conn, &f.client, &request("p1", "2099-01-01", "10:00 AM"), today())
                .unwrap();
        assert_eq!(view.booking.status, BookingStatus::Pending);
        assert_eq!(view.booking.client_id, "c1");
        assert_eq!(view.client.unwrap().name, "Client c1");
        assert_eq!(view.service_provider.unwrap().category, Some(Category::Plumber));

        let client = queries::get_user(&f.conn, "c1").unwrap().unwrap();
        let provider = queries::get_provider(&f.conn, "p1").unwrap().unwrap();
        assert_eq!(client.total_bookings, 1);
        assert_eq!(provider.total_bookings, 1);
    }

    #[test]
    fn test_double_booking_same_slot_conflicts() {
        let mut f = setup();
        book(&mut f, "10:00 AM");
        let err = create(
            &mut f.conn,
            &f.other_client,
            &request("p1", "2099-01-01", "10:00 AM"),
            today(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::SlotConflict(_)));

        // Another slot, or another provider, is fine.
        book(&mut f, "11:00 AM");
        create(&mut f.conn, &f.client, &request("p2", "2099-01-01", "10:00 AM"), today()).unwrap();
    }

    #[test]
    fn test_cancelled_booking_frees_slot() {
        let mut f = setup();
        let id = book(&mut f, "10:00 AM");
        cancel(&mut f.conn, &id, &f.client, Some("Changed plans")).unwrap();
        book(&mut f, "10:00 AM");
    }

    #[test]
    fn test_past_date_rejected_and_nothing_written() {
        let mut f = setup();
        let yesterday = today().pred_opt().unwrap().to_string();
        let err = create(&mut f.conn, &f.client, &request("p1", &yesterday, "10:00 AM"), today())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            queries::count_bookings(&f.conn, Party::Client("c1"), None).unwrap(),
            0
        );
    }

    #[test]
    fn test_today_is_allowed() {
        let mut f = setup();
        let date = today().to_string();
        create(&mut f.conn, &f.client, &request("p1", &date, "10:00 AM"), today()).unwrap();
    }

    #[test]
    fn test_create_validation() {
        let mut f = setup();
        let missing = NewBooking {
            location: None,
            payment_method: Some(" ".into()),
            ..request("p1", "2099-01-01", "10:00 AM")
        };
        let err = create(&mut f.conn, &f.client, &missing, today()).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: location, paymentMethod");

        let zero = NewBooking {
            total_amount: Some(0.0.into()),
            ..request("p1", "2099-01-01", "10:00 AM")
        };
        assert!(matches!(
            create(&mut f.conn, &f.client, &zero, today()).unwrap_err(),
            AppError::Validation(_)
        ));

        let bad_payment = NewBooking {
            payment_method: Some("cheque".into()),
            ..request("p1", "2099-01-01", "10:00 AM")
        };
        assert!(matches!(
            create(&mut f.conn, &f.client, &bad_payment, today()).unwrap_err(),
            AppError::Validation(_)
        ));

        let bad_date = request("p1", "01/01/2099", "10:00 AM");
        assert!(matches!(
            create(&mut f.conn, &f.client, &bad_date, today()).unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn test_create_unknown_or_offline_provider() {
        let mut f = setup();
        let err = create(&mut f.conn, &f.client, &request("ghost", "2099-01-01", "10:00 AM"), today())
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = create(&mut f.conn, &f.client, &request("p3", "2099-01-01", "10:00 AM"), today())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_providers_cannot_create() {
        let mut f = setup();
        let err = create(
            &mut f.conn,
            &f.other_provider,
            &request("p1", "2099-01-01", "10:00 AM"),
            today(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_rfc3339_date_accepted() {
        let mut f = setup();
        let view = create(
            &mut f.conn,
            &f.client,
            &request("p1", "2099-01-01T00:00:00Z", "10:00 AM"),
            today(),
        )
        .unwrap();
        assert_eq!(view.booking.date.to_string(), "2099-01-01");
    }

    #[test]
    fn test_accept_then_complete() {
        let mut f = setup();
        let id = book(&mut f, "10:00 AM");
        let accepted = accept(&mut f.conn, &id, &f.provider).unwrap();
        assert_eq!(accepted.booking.status, BookingStatus::Accepted);
        let done = complete(&mut f.conn, &id, &f.provider).unwrap();
        assert_eq!(done.booking.status, BookingStatus::Completed);

        let err = cancel(&mut f.conn, &id, &f.client, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn test_only_assigned_provider_may_act() {
        let mut f = setup();
        let id = book(&mut f, "10:00 AM");

        for actor in [&f.client, &f.other_provider] {
            assert!(matches!(
                accept(&mut f.conn, &id, actor).unwrap_err(),
                AppError::Forbidden(_)
            ));
            assert!(matches!(
                reject(&mut f.conn, &id, actor, None).unwrap_err(),
                AppError::Forbidden(_)
            ));
            assert!(matches!(
                complete(&mut f.conn, &id, actor).unwrap_err(),
                AppError::Forbidden(_)
            ));
        }
        assert_eq!(load(&f.conn, &id).unwrap().status, BookingStatus::Pending);
    }

    #[test]
    fn test_reject_records_reason() {
        let mut f = setup();
        let id = book(&mut f, "10:00 AM");
        let view = reject(&mut f.conn, &id, &f.provider, Some("  On leave ")).unwrap();
        assert_eq!(view.booking.status, BookingStatus::Rejected);
        assert_eq!(view.booking.rejection_reason.as_deref(), Some("On leave"));
    }

    #[test]
    fn test_cancel_by_either_party_only() {
        let mut f = setup();
        let id = book(&mut f, "10:00 AM");
        assert!(matches!(
            cancel(&mut f.conn, &id, &f.other_client, None).unwrap_err(),
            AppError::Forbidden(_)
        ));
        let view = cancel(&mut f.conn, &id, &f.provider, Some("Sick")).unwrap();
        assert_eq!(view.booking.status, BookingStatus::Cancelled);
        assert_eq!(view.booking.cancellation_reason.as_deref(), Some("Sick"));
    }

    /// Drives a booking into `from` through legal moves only.
    fn booking_in(f: &mut Fixture, from: BookingStatus, time: &str) -> String {
        let id = book(f, time);
        match from {
            BookingStatus::Pending => {}
            BookingStatus::Accepted => {
                accept(&mut f.conn, &id, &f.provider).unwrap();
            }
            BookingStatus::Rejected => {
                reject(&mut f.conn, &id, &f.provider, None).unwrap();
            }
            BookingStatus::Completed => {
                accept(&mut f.conn, &id, &f.provider).unwrap();
                complete(&mut f.conn, &id, &f.provider).unwrap();
            }
            BookingStatus::Cancelled => {
                cancel(&mut f.conn, &id, &f.client, None).unwrap();
            }
        }
        id
    }

    #[test]
    fn test_every_illegal_transition_is_invalid() {
        let mut f = setup();
        let ops = [
            BookingStatus::Accepted,
            BookingStatus::Rejected,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ];
        for (i, from) in BookingStatus::ALL.into_iter().enumerate() {
            for (j, to) in ops.into_iter().enumerate() {
                let time = format!("slot-{i}-{j}");
                let id = booking_in(&mut f, from, &time);
                let result = match to {
                    BookingStatus::Accepted => accept(&mut f.conn, &id, &f.provider),
                    BookingStatus::Rejected => reject(&mut f.conn, &id, &f.provider, None),
                    BookingStatus::Completed => complete(&mut f.conn, &id, &f.provider),
                    BookingStatus::Cancelled => cancel(&mut f.conn, &id, &f.client, None),
                    BookingStatus::Pending => unreachable!(),
                };
                if from.can_transition_to(to) {
                    assert_eq!(result.unwrap().booking.status, to);
                } else {
                    assert!(
                        matches!(result, Err(AppError::InvalidTransition(_))),
                        "{} -> {} should be invalid",
                        from.as_str(),
                        to.as_str()
                    );
                    assert_eq!(load(&f.conn, &id).unwrap().status, from);
                }
            }
        }
    }

    #[test]
    fn test_accept_conflicts_with_existing_accepted_slot() {
        let mut f = setup();
        let now = Utc::now().naive_utc();
        let date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        // Legacy rows predating the live-slot index.
        f.conn
            .execute_batch("DROP INDEX idx_bookings_live_slot;")
            .unwrap();
        for (id, status) in [("b-acc", BookingStatus::Accepted), ("b-pen", BookingStatus::Pending)] {
            queries::insert_booking(
                &f.conn,
                &Booking {
                    id: id.to_string(),
                    client_id: "c1".to_string(),
                    provider_id: "p1".to_string(),
                    service_type: "Pipe repair".to_string(),
                    date,
                    time: "10:00 AM".to_string(),
                    location: "12 Park Street".to_string(),
                    description: None,
                    total_amount: 450.0,
                    payment_method: PaymentMethod::Card,
                    status,
                    rejection_reason: None,
                    cancellation_reason: None,
                    created_at: now,
                    updated_at: now,
                },
            )
            .unwrap();
        }

        let err = accept(&mut f.conn, "b-pen", &f.provider).unwrap_err();
        assert!(matches!(err, AppError::SlotConflict(_)));
        assert_eq!(load(&f.conn, "b-pen").unwrap().status, BookingStatus::Pending);
    }

    #[test]
    fn test_get_restricted_to_parties() {
        let mut f = setup();
        let id = book(&mut f, "10:00 AM");
        assert!(get(&f.conn, &id, &f.client).is_ok());
        assert!(get(&f.conn, &id, &f.provider).is_ok());
        assert!(matches!(
            get(&f.conn, &id, &f.other_client).unwrap_err(),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            get(&f.conn, "nope", &f.client).unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn test_listings_paginate_and_filter() {
        let mut f = setup();
        let first = book(&mut f, "09:00 AM");
        let second = book(&mut f, "10:00 AM");
        let third = book(&mut f, "11:00 AM");
        accept(&mut f.conn, &second, &f.provider).unwrap();

        let query = ListQuery {
            page: Some(1),
            limit: Some(2),
            status: None,
        };
        let page = list_for_client(&f.conn, &f.client, &query).unwrap();
        let ids: Vec<_> = page.bookings.iter().map(|b| b.booking.id.clone()).collect();
        assert_eq!(ids, vec![third.clone(), second.clone()]);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.pages, 2);

        let accepted = ListQuery {
            status: Some("accepted".into()),
            ..Default::default()
        };
        let page = list_for_provider(&f.conn, &f.provider, &accepted).unwrap();
        assert_eq!(page.bookings.len(), 1);
        assert_eq!(page.bookings[0].booking.id, second);

        let requests = pending_requests(&f.conn, &f.provider).unwrap();
        let ids: Vec<_> = requests.requests.iter().map(|b| b.booking.id.clone()).collect();
        assert_eq!(ids, vec![third, first]);
    }

    #[test]
    fn test_listing_roles_enforced() {
        let f = setup();
        let query = ListQuery::default();
        assert!(matches!(
            list_for_provider(&f.conn, &f.client, &query).unwrap_err(),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            list_for_client(&f.conn, &f.provider, &query).unwrap_err(),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            pending_requests(&f.conn, &f.client).unwrap_err(),
            AppError::Forbidden(_)
        ));
        let bad_status = ListQuery {
            status: Some("confirmed".into()),
            ..Default::default()
        };
        assert!(matches!(
            list_for_client(&f.conn, &f.client, &bad_status).unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn test_provider_stats_counts_earnings() {
        let mut f = setup();
        let a = book(&mut f, "09:00 AM");
        book(&mut f, "10:00 AM");
        accept(&mut f.conn, &a, &f.provider).unwrap();
        complete(&mut f.conn, &a, &f.provider).unwrap();

        let stats = provider_stats(&f.conn, &f.provider, today()).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert!((stats.total_earnings - 450.0).abs() < 1e-9);
    }
}
