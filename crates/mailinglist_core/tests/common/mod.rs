#![allow(dead_code)]

use mailinglist_core::{
    Collaborators, DirectorySnapshot, LogCode, LogQuery, Mailinglist, MailinglistId,
    MailinglistService, MailinglistType, PersonaId, RegistrationStatus, Role, SubscriptionState,
    SubscriptionService, User,
};
use rusqlite::Connection;
use std::collections::BTreeMap;

pub const MODERATOR: PersonaId = 100;
pub const MEMBER: PersonaId = 1;
pub const LIST_USER: PersonaId = 2;
pub const LIST_ADMIN: PersonaId = 9;
pub const EVENT: i64 = 10;
pub const ASSEMBLY: i64 = 20;

/// Personas 1 (member), 2 (ml), 3..=5 (event and assembly users) and the
/// moderator. Event 10 has 3 and 4 as participants and 5 cancelled.
/// Assembly 20 has 3 and 4 attending and 5 presiding.
pub fn directory() -> DirectorySnapshot {
    let mut snapshot = DirectorySnapshot::new();
    snapshot.add_persona(MODERATOR, [Role::Ml]);
    snapshot.add_persona(MEMBER, [Role::Member]);
    snapshot.add_persona(LIST_USER, [Role::Ml]);
    for persona_id in 3..=5 {
        snapshot.add_persona(persona_id, [Role::Event, Role::Assembly]);
    }
    snapshot.register(EVENT, 3, [RegistrationStatus::Participant]);
    snapshot.register(
        EVENT,
        4,
        [RegistrationStatus::Participant, RegistrationStatus::Waitlist],
    );
    snapshot.register(EVENT, 5, [RegistrationStatus::Cancelled]);
    let assembly = snapshot.assembly_mut(ASSEMBLY);
    assembly.attendees.extend([3, 4]);
    assembly.presiders.insert(5);
    snapshot
}

pub fn user(persona_id: PersonaId, role: Role) -> User {
    User::new(persona_id, [role])
}

/// Holds only the universal list admin role, no event or assembly rights.
pub fn list_admin() -> User {
    User::new(LIST_ADMIN, [Role::MlAdmin])
}

pub fn draft(ml_type: MailinglistType, local_part: &str) -> Mailinglist {
    Mailinglist::draft(ml_type, format!("List {local_part}"), local_part, [MODERATOR])
}

pub fn event_draft(local_part: &str) -> Mailinglist {
    let mut ml = draft(MailinglistType::EventAssociated, local_part);
    ml.event_id = Some(EVENT);
    ml.registration_stati.insert(RegistrationStatus::Participant);
    ml
}

pub fn assembly_draft(ml_type: MailinglistType, local_part: &str) -> Mailinglist {
    let mut ml = draft(ml_type, local_part);
    ml.assembly_id = Some(ASSEMBLY);
    ml
}

pub fn create_list(
    conn: &Connection,
    snapshot: &DirectorySnapshot,
    ml: &Mailinglist,
) -> MailinglistId {
    MailinglistService::new(conn, Collaborators::from_single(snapshot))
        .create_mailinglist(&User::automation(), ml)
        .expect("list creation should succeed")
}

pub fn states(
    conn: &Connection,
    snapshot: &DirectorySnapshot,
    mailinglist_id: MailinglistId,
) -> BTreeMap<PersonaId, SubscriptionState> {
    SubscriptionService::new(conn, Collaborators::from_single(snapshot))
        .get_subscription_states(&User::automation(), mailinglist_id, &[])
        .expect("state listing should succeed")
}

pub fn log_codes(
    conn: &Connection,
    snapshot: &DirectorySnapshot,
    mailinglist_id: MailinglistId,
) -> Vec<LogCode> {
    MailinglistService::new(conn, Collaborators::from_single(snapshot))
        .retrieve_log(
            &User::automation(),
            &LogQuery {
                mailinglist_ids: vec![mailinglist_id],
                limit: Some(500),
                ..LogQuery::default()
            },
        )
        .expect("log retrieval should succeed")
        .into_iter()
        .map(|entry| entry.code)
        .collect()
}

pub fn count_code(codes: &[LogCode], code: LogCode) -> usize {
    codes.iter().filter(|value| **value == code).count()
}
