//! Fixtures shared by the in-crate test modules.

use chrono::{Duration, Local, NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::authorization::Principal;
use crate::db;
use crate::models::enums::{AppointmentStatus, Permission, Role, StaffRole};
use crate::models::*;

pub struct Fixture {
    pub citizen: User,
    pub staff_user: User,
    pub admin: User,
    pub center: Center,
    pub other_center: Center,
    pub service: Service,
}

pub fn user(conn: &Connection, name: &str, role: Role) -> User {
    let user = User {
        id: Uuid::new_v4(),
        name: name.into(),
        email: format!("{}@example.in", name.to_lowercase().replace(' ', ".")),
        phone: None,
        role,
        is_active: true,
        created_at: Utc::now(),
    };
    db::insert_user(conn, &user).unwrap();
    user
}

pub fn center(conn: &Connection, name: &str) -> Center {
    let center = Center {
        id: Uuid::new_v4(),
        name: name.into(),
        address: Some("Thiruvananthapuram".into()),
        is_active: true,
    };
    db::insert_center(conn, &center).unwrap();
    center
}

pub fn staff_at(conn: &Connection, user: &User, center: &Center, permissions: &[Permission]) -> Staff {
    let staff = Staff {
        id: Uuid::new_v4(),
        user_id: user.id,
        center_id: center.id,
        role: StaffRole::Staff,
        permissions: permissions.to_vec(),
        is_active: true,
    };
    db::insert_staff(conn, &staff).unwrap();
    staff
}

pub fn service(conn: &Connection, name: &str, fee: f64) -> Service {
    let service = Service {
        id: Uuid::new_v4(),
        name: name.into(),
        category: "certificates".into(),
        fee,
        processing_time: Some("3 days".into()),
        required_documents: vec![RequiredDocument {
            name: "Aadhaar Card".into(),
            alternatives: vec!["Voter ID".into()],
            preview_image: None,
        }],
        is_active: true,
    };
    db::insert_service(conn, &service).unwrap();
    service
}

pub fn all_staff_permissions() -> Vec<Permission> {
    Permission::ALL.to_vec()
}

/// Citizen, one staff member with every permission at `center`, an admin,
/// a second center and a priced service.
pub fn seed(conn: &Connection) -> Fixture {
    let citizen = user(conn, "Anjali Nair", Role::User);
    let staff_user = user(conn, "Ravi Kumar", Role::Staff);
    let admin = user(conn, "Portal Admin", Role::Admin);
    let home_center = center(conn, "Akshaya Kowdiar");
    let other_center = center(conn, "Akshaya Pattom");
    staff_at(conn, &staff_user, &home_center, &all_staff_permissions());
    let service = service(conn, "Income Certificate", 40.0);
    Fixture {
        citizen,
        staff_user,
        admin,
        center: home_center,
        other_center,
        service,
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First day on or after `from` that accepts bookings.
pub fn open_day(from: NaiveDate) -> NaiveDate {
    let mut day = from;
    while crate::appointment::closed_reason(day).is_some() {
        day += Duration::days(1);
    }
    day
}

pub fn selected(name: &str) -> SelectedDocument {
    SelectedDocument {
        document_name: name.into(),
        is_alternative: false,
        alternative_name: None,
        selected_at: Utc::now(),
    }
}

pub fn selected_alternative(primary: &str, alternative: &str) -> SelectedDocument {
    SelectedDocument {
        document_name: primary.into(),
        is_alternative: true,
        alternative_name: Some(alternative.into()),
        selected_at: Utc::now(),
    }
}

pub fn appointment_on(
    conn: &Connection,
    fx: &Fixture,
    center_id: Uuid,
    date: NaiveDate,
    status: AppointmentStatus,
) -> Appointment {
    let now = Utc::now();
    let appt = Appointment {
        id: Uuid::new_v4(),
        user_id: fx.citizen.id,
        service_id: fx.service.id,
        center_id,
        appointment_date: date,
        time_slot: "10:00 AM".into(),
        status,
        selected_documents: vec![
            selected("Aadhaar Card"),
            selected_alternative("Ration Card", "Electricity Bill"),
        ],
        document_validation: DocumentValidation::default(),
        notes: None,
        processing_notes: None,
        created_at: now - Duration::minutes(5),
        completed_at: (status == AppointmentStatus::Completed).then_some(now),
        actual_duration_minutes: None,
    };
    db::insert_appointment(conn, &appt).unwrap();
    appt
}

pub fn pending_appointment(conn: &Connection, fx: &Fixture) -> Appointment {
    appointment_on(conn, fx, fx.center.id, today(), AppointmentStatus::Pending)
}

pub fn principal(conn: &Connection, user: &User) -> Principal {
    crate::authorization::load_principal(conn, &user.id).unwrap()
}
