//! Staff dashboard: read-only aggregates over appointments.
//!
//! Partial data never fails the snapshot. A dangling service reference
//! counts as "Unknown" with a zero fee.

use chrono::{Duration, NaiveDate};
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::appointment::{slot_minutes, WorkflowError};
use crate::authorization::Principal;
use crate::db::{self, DatabaseError};
use crate::models::enums::{AppointmentStatus, Permission};
use crate::models::Notification;

/// Upcoming appointments shown on the dashboard.
const UPCOMING_LIMIT: usize = 5;
/// Recent notifications shown on the dashboard.
const RECENT_NOTIFICATIONS: u32 = 5;

// ═══════════════════════════════════════════════════════════
// Date ranges
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    Today,
    Tomorrow,
    Week,
    Month,
    #[default]
    All,
}

impl DateRange {
    /// `[from, to)` appointment-date bounds relative to `today`.
    pub fn bounds(self, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let tomorrow = today + Duration::days(1);
        match self {
            DateRange::Today => (Some(today), Some(tomorrow)),
            DateRange::Tomorrow => (Some(tomorrow), Some(tomorrow + Duration::days(1))),
            DateRange::Week => (Some(today), Some(today + Duration::days(7))),
            DateRange::Month => (Some(today), Some(today + Duration::days(30))),
            DateRange::All => (None, None),
        }
    }
}

fn today_range() -> DateRange {
    DateRange::Today
}

// ═══════════════════════════════════════════════════════════
// Snapshot types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u64,
    pub confirmed: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub total: u64,
}

impl StatusCounts {
    fn add(&mut self, status: AppointmentStatus, n: u64) {
        let slot = match status {
            AppointmentStatus::Pending => &mut self.pending,
            AppointmentStatus::Confirmed => &mut self.confirmed,
            AppointmentStatus::InProgress => &mut self.in_progress,
            AppointmentStatus::Completed => &mut self.completed,
            AppointmentStatus::Cancelled => &mut self.cancelled,
        };
        *slot += n;
        self.total += n;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCount {
    pub service_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingAppointment {
    pub id: Uuid,
    pub citizen_name: String,
    pub service_name: String,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub range: DateRange,
    pub center: Option<CenterSummary>,
    pub counts: StatusCounts,
    pub today_revenue: f64,
    pub by_service: Vec<ServiceCount>,
    pub upcoming: Vec<UpcomingAppointment>,
    pub recent_notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStats {
    pub range: DateRange,
    pub by_status: StatusCounts,
    pub by_service: Vec<ServiceCount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    #[serde(default = "today_range")]
    pub range: DateRange,
    /// Admin only; staff are always pinned to their own center.
    pub center_id: Option<Uuid>,
}

impl Default for DashboardQuery {
    fn default() -> Self {
        Self {
            range: today_range(),
            center_id: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Aggregate queries
// ═══════════════════════════════════════════════════════════

/// WHERE clause + params over `appointments a` for a center and date range.
struct Scope {
    clause: String,
    params: Vec<String>,
}

impl Scope {
    fn new(center_id: Option<Uuid>, range: DateRange, today: NaiveDate) -> Self {
        let mut scope = Scope {
            clause: String::from("1=1"),
            params: Vec::new(),
        };
        if let Some(center) = center_id {
            scope.push("a.center_id = ?", center.to_string());
        }
        let (from, to) = range.bounds(today);
        if let Some(from) = from {
            scope.push("a.appointment_date >= ?", from.to_string());
        }
        if let Some(to) = to {
            scope.push("a.appointment_date < ?", to.to_string());
        }
        scope
    }

    fn push(&mut self, condition: &str, value: String) {
        self.params.push(value);
        self.clause
            .push_str(&format!(" AND {}", condition.replace('?', &format!("?{}", self.params.len()))));
    }
}

fn status_counts(conn: &Connection, scope: &Scope) -> Result<StatusCounts, DatabaseError> {
    let sql = format!(
        "SELECT a.status, COUNT(*) FROM appointments a WHERE {} GROUP BY a.status",
        scope.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(scope.params.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, n) = row?;
        match status.parse::<AppointmentStatus>() {
            Ok(s) => counts.add(s, n.max(0) as u64),
            Err(e) => tracing::warn!("Skipping unknown status in dashboard counts: {e}"),
        }
    }
    Ok(counts)
}

fn service_counts(conn: &Connection, scope: &Scope) -> Result<Vec<ServiceCount>, DatabaseError> {
    let sql = format!(
        "SELECT COALESCE(s.name, 'Unknown') AS service_name, COUNT(*) AS n
         FROM appointments a LEFT JOIN services s ON s.id = a.service_id
         WHERE {}
         GROUP BY service_name ORDER BY n DESC, service_name ASC",
        scope.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(scope.params.iter()), |row| {
        Ok(ServiceCount {
            service_name: row.get(0)?,
            count: row.get::<_, i64>(1)?.max(0) as u64,
        })
    })?;
    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

/// Sum of service fees for appointments completed with today's date.
pub fn today_revenue(
    conn: &Connection,
    center_id: Option<Uuid>,
    today: NaiveDate,
) -> Result<f64, DatabaseError> {
    let mut scope = Scope::new(center_id, DateRange::Today, today);
    scope.push("a.status = ?", AppointmentStatus::Completed.as_str().into());
    let sql = format!(
        "SELECT COALESCE(SUM(COALESCE(s.fee, 0)), 0)
         FROM appointments a LEFT JOIN services s ON s.id = a.service_id
         WHERE {}",
        scope.clause
    );
    let revenue: f64 = conn.query_row(&sql, params_from_iter(scope.params.iter()), |row| row.get(0))?;
    Ok(revenue)
}

fn upcoming(conn: &Connection, scope: &Scope) -> Result<Vec<UpcomingAppointment>, DatabaseError> {
    let sql = format!(
        "SELECT a.id, COALESCE(u.name, 'Unknown'), COALESCE(s.name, 'Unknown'),
                a.appointment_date, a.time_slot, a.status
         FROM appointments a
         LEFT JOIN users u ON u.id = a.user_id
         LEFT JOIN services s ON s.id = a.service_id
         WHERE {} AND a.status IN ('confirmed', 'in_progress')",
        scope.clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(scope.params.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, NaiveDate>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (id, citizen_name, service_name, appointment_date, time_slot, status) = row?;
        items.push(UpcomingAppointment {
            id: db::repository::parse_uuid(&id)?,
            citizen_name,
            service_name,
            appointment_date,
            time_slot,
            status: status.parse()?,
        });
    }
    items.sort_by_key(|a| (a.appointment_date, slot_minutes(&a.time_slot)));
    items.truncate(UPCOMING_LIMIT);
    Ok(items)
}

/// Center the caller aggregates over: staff are pinned, admins choose.
fn resolve_center(principal: &Principal, requested: Option<Uuid>) -> Option<Uuid> {
    principal
        .center_scope()
        .or(requested.filter(|_| principal.is_admin()))
}

/// Dashboard snapshot for staff and admins.
pub fn get_snapshot(
    conn: &Connection,
    principal: &Principal,
    query: &DashboardQuery,
    today: NaiveDate,
) -> Result<DashboardSnapshot, WorkflowError> {
    principal.require_staff()?;
    let center_id = resolve_center(principal, query.center_id);
    let scope = Scope::new(center_id, query.range, today);

    let center = match center_id {
        Some(id) => Some(CenterSummary {
            id,
            name: db::get_center(conn, &id)?
                .map(|c| c.name)
                .unwrap_or_else(|| "Unknown".into()),
        }),
        None => None,
    };

    Ok(DashboardSnapshot {
        range: query.range,
        center,
        counts: status_counts(conn, &scope)?,
        today_revenue: today_revenue(conn, center_id, today)?,
        by_service: service_counts(conn, &scope)?,
        upcoming: upcoming(conn, &scope)?,
        recent_notifications: db::list_notifications(conn, &principal.user_id, RECENT_NOTIFICATIONS)?,
    })
}

/// Report view: counts by status and by service (`view_reports`).
pub fn get_stats(
    conn: &Connection,
    principal: &Principal,
    query: &DashboardQuery,
    today: NaiveDate,
) -> Result<AppointmentStats, WorkflowError> {
    principal.require(Permission::ViewReports)?;
    let scope = Scope::new(resolve_center(principal, query.center_id), query.range, today);
    Ok(AppointmentStats {
        range: query.range,
        by_status: status_counts(conn, &scope)?,
        by_service: service_counts(conn, &scope)?,
    })
}
