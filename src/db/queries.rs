use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::models::{
    AvailabilityWindow, Booking, BookingStatus, Category, PaymentMethod, Provider,
    ProviderStatus, Review, User,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_PARSE_FORMAT)
        .with_context(|| format!("invalid timestamp in store: {s}"))
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("invalid date in store: {s}"))
}

// ── Identity ──

/// Emails are unique across users and providers alike.
pub fn email_registered(conn: &Connection, email: &str) -> anyhow::Result<bool> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)
             OR EXISTS(SELECT 1 FROM providers WHERE email = ?1)",
        params![email],
        |row| row.get(0),
    )?;
    Ok(taken)
}

// ── Users ──

const USER_COLUMNS: &str =
    "id, name, email, phone, password_hash, image, is_verified, total_bookings, created_at";

pub fn insert_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, phone, password_hash, image, is_verified, total_bookings, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user.id,
            user.name,
            user.email,
            user.phone,
            user.password_hash,
            user.image,
            user.is_verified,
            user.total_bookings,
            format_timestamp(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            |row| Ok(parse_user_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            |row| Ok(parse_user_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub fn increment_user_bookings(conn: &Connection, id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET total_bookings = total_bookings + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

fn parse_user_row(row: &rusqlite::Row) -> anyhow::Result<User> {
    let created_at: String = row.get(8)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        password_hash: row.get(4)?,
        image: row.get(5)?,
        is_verified: row.get(6)?,
        total_bookings: row.get(7)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

// ── Providers ──

const PROVIDER_COLUMNS: &str = "id, name, email, phone, password_hash, category, experience, price, status, image, rating, availability, is_verified, total_bookings, created_at";

pub fn insert_provider(conn: &Connection, provider: &Provider) -> anyhow::Result<()> {
    let availability = serde_json::to_string(&provider.availability)?;
    conn.execute(
        "INSERT INTO providers (id, name, email, phone, password_hash, category, experience, price, status, image, rating, availability, is_verified, total_bookings, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            provider.id,
            provider.name,
            provider.email,
            provider.phone,
            provider.password_hash,
            provider.category.as_str(),
            provider.experience,
            provider.price,
            provider.status.as_str(),
            provider.image,
            provider.rating,
            availability,
            provider.is_verified,
            provider.total_bookings,
            format_timestamp(&provider.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_provider(conn: &Connection, id: &str) -> anyhow::Result<Option<Provider>> {
    let row = conn
        .query_row(
            &format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = ?1"),
            params![id],
            |row| Ok(parse_provider_row(row)),
        )
        .optional()?;

    match row.transpose()? {
        Some(mut provider) => {
            provider.reviews = list_reviews(conn, &provider.id)?;
            Ok(Some(provider))
        }
        None => Ok(None),
    }
}

pub fn find_provider_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<Provider>> {
    let row = conn
        .query_row(
            &format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE email = ?1"),
            params![email],
            |row| Ok(parse_provider_row(row)),
        )
        .optional()?;

    match row.transpose()? {
        Some(mut provider) => {
            provider.reviews = list_reviews(conn, &provider.id)?;
            Ok(Some(provider))
        }
        None => Ok(None),
    }
}

pub fn list_providers(
    conn: &Connection,
    category: Option<Category>,
) -> anyhow::Result<Vec<Provider>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers
         WHERE (?1 IS NULL OR category = ?1)
         ORDER BY created_at ASC, rowid ASC"
    ))?;

    let rows = stmt.query_map(params![category.map(|c| c.as_str())], |row| {
        Ok(parse_provider_row(row))
    })?;

    let mut providers = vec![];
    for row in rows {
        let mut provider = row??;
        provider.reviews = list_reviews(conn, &provider.id)?;
        providers.push(provider);
    }
    Ok(providers)
}

/// Writes the editable profile fields; status, rating and reviews have
/// their own writers.
pub fn update_provider_profile(conn: &Connection, provider: &Provider) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE providers SET name = ?1, phone = ?2, category = ?3, experience = ?4, price = ?5, image = ?6
         WHERE id = ?7",
        params![
            provider.name,
            provider.phone,
            provider.category.as_str(),
            provider.experience,
            provider.price,
            provider.image,
            provider.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn set_provider_status(
    conn: &Connection,
    id: &str,
    status: ProviderStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE providers SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_provider_availability(
    conn: &Connection,
    id: &str,
    windows: &[AvailabilityWindow],
) -> anyhow::Result<bool> {
    let availability = serde_json::to_string(windows)?;
    let count = conn.execute(
        "UPDATE providers SET availability = ?1 WHERE id = ?2",
        params![availability, id],
    )?;
    Ok(count > 0)
}

pub fn set_provider_rating(conn: &Connection, id: &str, rating: f64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE providers SET rating = ?1 WHERE id = ?2",
        params![rating, id],
    )?;
    Ok(())
}

pub fn increment_provider_bookings(conn: &Connection, id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE providers SET total_bookings = total_bookings + 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

fn parse_provider_row(row: &rusqlite::Row) -> anyhow::Result<Provider> {
    let category_str: String = row.get(5)?;
    let status_str: String = row.get(8)?;
    let availability_json: String = row.get(11)?;
    let created_at: String = row.get(14)?;

    let category = Category::parse(&category_str)
        .with_context(|| format!("unknown provider category in store: {category_str}"))?;
    let status = ProviderStatus::parse(&status_str)
        .with_context(|| format!("unknown provider status in store: {status_str}"))?;
    let availability: Vec<AvailabilityWindow> = serde_json::from_str(&availability_json)
        .context("invalid provider availability in store")?;

    Ok(Provider {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        password_hash: row.get(4)?,
        category,
        experience: row.get(6)?,
        price: row.get(7)?,
        status,
        image: row.get(9)?,
        rating: row.get(10)?,
        reviews: vec![],
        availability,
        is_verified: row.get(12)?,
        total_bookings: row.get(13)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

// ── Reviews ──

pub fn insert_review(conn: &Connection, provider_id: &str, review: &Review) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reviews (provider_id, reviewer_id, rating, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            provider_id,
            review.reviewer_id,
            review.rating,
            review.comment,
            format_timestamp(&review.created_at),
        ],
    )?;
    Ok(())
}

/// Reviews in append order.
pub fn list_reviews(conn: &Connection, provider_id: &str) -> anyhow::Result<Vec<Review>> {
    let mut stmt = conn.prepare(
        "SELECT reviewer_id, rating, comment, created_at
         FROM reviews WHERE provider_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![provider_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut reviews = vec![];
    for row in rows {
        let (reviewer_id, rating, comment, created_at) = row?;
        reviews.push(Review {
            reviewer_id,
            rating,
            comment,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(reviews)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, client_id, provider_id, service_type, date, time, location, description, total_amount, payment_method, status, rejection_reason, cancellation_reason, created_at, updated_at";

/// Which side of a booking a listing is scoped to.
#[derive(Debug, Clone, Copy)]
pub enum Party<'a> {
    Client(&'a str),
    Provider(&'a str),
}

impl Party<'_> {
    fn column(&self) -> &'static str {
        match self {
            Party::Client(_) => "client_id",
            Party::Provider(_) => "provider_id",
        }
    }

    fn id(&self) -> &str {
        match self {
            Party::Client(id) | Party::Provider(id) => id,
        }
    }
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, client_id, provider_id, service_type, date, time, location, description, total_amount, payment_method, status, rejection_reason, cancellation_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            booking.id,
            booking.client_id,
            booking.provider_id,
            booking.service_type,
            format_date(&booking.date),
            booking.time,
            booking.location,
            booking.description,
            booking.total_amount,
            booking.payment_method.as_str(),
            booking.status.as_str(),
            booking.rejection_reason,
            booking.cancellation_reason,
            format_timestamp(&booking.created_at),
            format_timestamp(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let row = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    row.transpose()
}

/// A pending or accepted booking holding the provider's slot.
pub fn find_live_booking_for_slot(
    conn: &Connection,
    provider_id: &str,
    date: &NaiveDate,
    time: &str,
) -> anyhow::Result<Option<Booking>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE provider_id = ?1 AND date = ?2 AND time = ?3
                   AND status IN ('pending', 'accepted')
                 LIMIT 1"
            ),
            params![provider_id, format_date(date), time],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub fn find_other_accepted_booking(
    conn: &Connection,
    provider_id: &str,
    date: &NaiveDate,
    time: &str,
    exclude_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE provider_id = ?1 AND date = ?2 AND time = ?3
                   AND status = 'accepted' AND id != ?4
                 LIMIT 1"
            ),
            params![provider_id, format_date(date), time, exclude_id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    row.transpose()
}

/// Compare-and-set status write. Returns false when the booking is missing
/// or no longer in `from`. A `None` reason leaves the stored one untouched.
pub fn transition_booking(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
    rejection_reason: Option<&str>,
    cancellation_reason: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           status = ?1,
           rejection_reason = COALESCE(?2, rejection_reason),
           cancellation_reason = COALESCE(?3, cancellation_reason),
           updated_at = ?4
         WHERE id = ?5 AND status = ?6",
        params![
            to.as_str(),
            rejection_reason,
            cancellation_reason,
            format_timestamp(now),
            id,
            from.as_str(),
        ],
    )?;
    Ok(count > 0)
}

/// Newest first.
pub fn list_bookings(
    conn: &Connection,
    party: Party<'_>,
    status: Option<BookingStatus>,
    limit: u32,
    offset: u64,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE {} = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3 OFFSET ?4",
        party.column()
    ))?;

    let offset = i64::try_from(offset).context("page offset out of range")?;
    let rows = stmt.query_map(
        params![party.id(), status.map(|s| s.as_str()), limit, offset],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn count_bookings(
    conn: &Connection,
    party: Party<'_>,
    status: Option<BookingStatus>,
) -> anyhow::Result<u64> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM bookings WHERE {} = ?1 AND (?2 IS NULL OR status = ?2)",
            party.column()
        ),
        params![party.id(), status.map(|s| s.as_str())],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub total: i64,
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub upcoming: i64,
    pub total_earnings: f64,
}

pub fn get_provider_stats(
    conn: &Connection,
    provider_id: &str,
    today: &NaiveDate,
) -> anyhow::Result<ProviderStats> {
    let mut stats = ProviderStats::default();

    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*), COALESCE(SUM(total_amount), 0)
         FROM bookings WHERE provider_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![provider_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;

    for row in rows {
        let (status, count, amount) = row?;
        stats.total += count;
        match BookingStatus::parse(&status) {
            Some(BookingStatus::Pending) => stats.pending = count,
            Some(BookingStatus::Accepted) => stats.accepted = count,
            Some(BookingStatus::Rejected) => stats.rejected = count,
            Some(BookingStatus::Completed) => {
                stats.completed = count;
                stats.total_earnings = amount;
            }
            Some(BookingStatus::Cancelled) => stats.cancelled = count,
            None => tracing::warn!(status = %status, "unknown booking status in store"),
        }
    }

    stats.upcoming = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE provider_id = ?1 AND status = 'accepted' AND date >= ?2",
        params![provider_id, format_date(today)],
        |row| row.get(0),
    )?;

    Ok(stats)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_str: String = row.get(4)?;
    let payment_str: String = row.get(9)?;
    let status_str: String = row.get(10)?;
    let created_at_str: String = row.get(13)?;
    let updated_at_str: String = row.get(14)?;

    let payment_method = PaymentMethod::parse(&payment_str)
        .with_context(|| format!("unknown payment method in store: {payment_str}"))?;
    let status = BookingStatus::parse(&status_str)
        .with_context(|| format!("unknown booking status in store: {status_str}"))?;

    Ok(Booking {
        id: row.get(0)?,
        client_id: row.get(1)?,
        provider_id: row.get(2)?,
        service_type: row.get(3)?,
        date: parse_date(&date_str)?,
        time: row.get(5)?,
        location: row.get(6)?,
        description: row.get(7)?,
        total_amount: row.get(8)?,
        payment_method,
        status,
        rejection_reason: row.get(11)?,
        cancellation_reason: row.get(12)?,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}
