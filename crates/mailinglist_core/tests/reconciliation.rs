mod common;

use common::{
    assembly_draft, count_code, create_list, directory, draft, event_draft, list_admin,
    log_codes, states, user, ASSEMBLY, EVENT, LIST_USER, MEMBER, MODERATOR,
};
use mailinglist_core::{
    open_db_in_memory, CollabResult, CollaboratorError, Collaborators, EngineError, EventId,
    EventRegistry, LogCode, MailinglistService, MailinglistType, MailinglistUpdate, PersonaId,
    ReconciliationService, RegistrationStatus, Role, SubscriptionAction, SubscriptionRequest,
    SubscriptionService, SubscriptionState, User,
};
use std::collections::{BTreeMap, BTreeSet};

/// Event registry whose registration lookups always fail.
struct UnavailableEvents;

impl EventRegistry for UnavailableEvents {
    fn is_live(&self, _event_id: EventId) -> CollabResult<bool> {
        Ok(true)
    }

    fn registrations(
        &self,
        _user: &User,
        event_id: EventId,
        _stati: &BTreeSet<RegistrationStatus>,
        _only: Option<PersonaId>,
    ) -> CollabResult<BTreeSet<PersonaId>> {
        Err(CollaboratorError::Unavailable(format!(
            "registrations of event {event_id}"
        )))
    }

    fn orgas(&self, _user: &User, _event_id: EventId) -> CollabResult<BTreeSet<PersonaId>> {
        Ok(BTreeSet::new())
    }
}

#[test]
fn event_list_starts_with_registered_participants() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &event_draft("party"));

    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([
            (3, SubscriptionState::Implicit),
            (4, SubscriptionState::Implicit),
        ])
    );
}

#[test]
fn second_pass_over_unchanged_inputs_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &event_draft("party"));
    let service = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot));

    let report = service
        .write_subscription_states(&User::automation(), None)
        .unwrap();
    assert_eq!(report.affected, 0);
    assert_eq!(report.processed, vec![ml_id]);
    assert!(report.is_success());
}

#[test]
fn withdrawn_participant_is_removed_and_logged() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &event_draft("party"));
    snapshot.register(EVENT, 3, [RegistrationStatus::Cancelled]);

    let service = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot));
    let delta = service.preview(&User::automation(), ml_id).unwrap();
    assert_eq!(delta.obsolete, BTreeSet::from([3]));
    assert!(delta.missing.is_empty());
    assert_eq!(
        states(&conn, &snapshot, ml_id).get(&3),
        Some(&SubscriptionState::Implicit)
    );

    let report = service
        .write_subscription_states(&User::automation(), Some(&[ml_id]))
        .unwrap();
    assert_eq!(report.affected, 1);
    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([(4, SubscriptionState::Implicit)])
    );
    assert_eq!(
        count_code(&log_codes(&conn, &snapshot, ml_id), LogCode::AutomaticallyRemoved),
        1
    );
}

#[test]
fn overrides_survive_loss_of_implicit_membership() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &event_draft("party"));
    SubscriptionService::new(&conn, Collaborators::from_single(&snapshot))
        .do_subscription_action(
            &User::automation(),
            SubscriptionRequest::new(SubscriptionAction::AddSubscriptionOverride, ml_id)
                .for_persona(4),
        )
        .unwrap();
    snapshot.register(EVENT, 4, [RegistrationStatus::Cancelled]);

    ReconciliationService::new(&conn, Collaborators::from_single(&snapshot))
        .write_subscription_states(&User::automation(), None)
        .unwrap();
    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([
            (3, SubscriptionState::Implicit),
            (4, SubscriptionState::SubscriptionOverride),
        ])
    );
}

#[test]
fn archived_events_and_inactive_lists_are_skipped() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    let event_list = create_list(&conn, &snapshot, &event_draft("party"));
    let general = create_list(
        &conn,
        &snapshot,
        &draft(MailinglistType::GeneralMandatory, "everyone"),
    );
    MailinglistService::new(&conn, Collaborators::from_single(&snapshot))
        .set_mailinglist(
            &User::automation(),
            general,
            &MailinglistUpdate {
                is_active: Some(false),
                ..MailinglistUpdate::default()
            },
        )
        .unwrap();

    snapshot.event_mut(EVENT).is_archived = true;
    snapshot.register(EVENT, 3, [RegistrationStatus::Cancelled]);

    let report = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot))
        .write_subscription_states(&User::automation(), None)
        .unwrap();
    assert_eq!(report.skipped, vec![event_list, general]);
    assert!(report.processed.is_empty());
    assert_eq!(report.affected, 0);
    assert_eq!(
        states(&conn, &snapshot, event_list).get(&3),
        Some(&SubscriptionState::Implicit)
    );
}

#[test]
fn failing_list_does_not_stop_the_run() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    let event_list = create_list(&conn, &snapshot, &event_draft("party"));
    let general = create_list(
        &conn,
        &snapshot,
        &draft(MailinglistType::GeneralMandatory, "everyone"),
    );
    snapshot.add_persona(6, [Role::Ml]);

    let events = UnavailableEvents;
    let collaborators = Collaborators::new(&snapshot, &events, &snapshot);
    let report = ReconciliationService::new(&conn, collaborators)
        .write_subscription_states(&User::automation(), None)
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, event_list);
    assert_eq!(report.processed, vec![general]);
    assert_eq!(report.affected, 1);
    assert_eq!(
        states(&conn, &snapshot, general).get(&6),
        Some(&SubscriptionState::Implicit)
    );
}

#[test]
fn reconciling_every_list_needs_ml_admin() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(
        &conn,
        &snapshot,
        &draft(MailinglistType::GeneralMandatory, "everyone"),
    );
    let service = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot));
    let moderator = user(MODERATOR, Role::Ml);

    let err = service
        .write_subscription_states(&moderator, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Privilege(_)), "{err}");

    let report = service
        .write_subscription_states(&moderator, Some(&[ml_id]))
        .unwrap();
    assert_eq!(report.processed, vec![ml_id]);

    let report = service
        .write_subscription_states(&user(MEMBER, Role::Member), Some(&[ml_id]))
        .unwrap();
    assert_eq!(report.failed.len(), 1);
}

#[test]
fn opt_out_keeps_unsubscribed_members_until_membership_ends() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    let ml_id = create_list(
        &conn,
        &snapshot,
        &draft(MailinglistType::MemberOptOut, "members"),
    );
    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([(MEMBER, SubscriptionState::Implicit)])
    );

    SubscriptionService::new(&conn, Collaborators::from_single(&snapshot))
        .do_subscription_action(
            &user(MEMBER, Role::Member),
            SubscriptionRequest::new(SubscriptionAction::Unsubscribe, ml_id),
        )
        .unwrap();

    let report = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot))
        .write_subscription_states(&User::automation(), None)
        .unwrap();
    assert_eq!(report.affected, 0);
    assert_eq!(
        states(&conn, &snapshot, ml_id).get(&MEMBER),
        Some(&SubscriptionState::Unsubscribed)
    );

    snapshot.add_persona(MEMBER, [Role::Ml]);
    let report = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot))
        .write_subscription_states(&User::automation(), None)
        .unwrap();
    assert_eq!(report.affected, 1);
    assert!(states(&conn, &snapshot, ml_id).is_empty());
}

#[test]
fn list_admin_creates_and_reconciles_event_lists() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    let admin = list_admin();
    let ml_id = MailinglistService::new(&conn, Collaborators::from_single(&snapshot))
        .create_mailinglist(&admin, &event_draft("party"))
        .unwrap();
    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([
            (3, SubscriptionState::Implicit),
            (4, SubscriptionState::Implicit),
        ])
    );

    snapshot.register(EVENT, 3, [RegistrationStatus::Cancelled]);
    let service = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot));
    let report = service
        .write_subscription_states(&admin, Some(&[ml_id]))
        .unwrap();
    assert_eq!(report.processed, vec![ml_id]);
    assert_eq!(report.affected, 1);

    let report = service.write_subscription_states(&admin, None).unwrap();
    assert!(report.is_success());
    assert_eq!(report.affected, 0);
    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([(4, SubscriptionState::Implicit)])
    );
}

#[test]
fn assembly_lists_follow_attendance_and_presidency() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    let attendees = create_list(
        &conn,
        &snapshot,
        &assembly_draft(MailinglistType::AssemblyAssociated, "vote"),
    );
    let presiders = create_list(
        &conn,
        &snapshot,
        &assembly_draft(MailinglistType::AssemblyPresider, "presiders"),
    );
    assert_eq!(
        states(&conn, &snapshot, attendees),
        BTreeMap::from([
            (3, SubscriptionState::Implicit),
            (4, SubscriptionState::Implicit),
        ])
    );
    assert_eq!(
        states(&conn, &snapshot, presiders),
        BTreeMap::from([(5, SubscriptionState::Implicit)])
    );

    snapshot.assembly_mut(ASSEMBLY).attendees.remove(&4);
    let report = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot))
        .write_subscription_states(&User::automation(), None)
        .unwrap();
    assert_eq!(report.affected, 1);
    assert_eq!(
        states(&conn, &snapshot, attendees),
        BTreeMap::from([(3, SubscriptionState::Implicit)])
    );
    assert_eq!(
        count_code(&log_codes(&conn, &snapshot, attendees), LogCode::AutomaticallyRemoved),
        1
    );
    assert_eq!(
        states(&conn, &snapshot, presiders),
        BTreeMap::from([(5, SubscriptionState::Implicit)])
    );
}

#[test]
fn orga_list_derives_event_organizers() {
    let conn = open_db_in_memory().unwrap();
    let mut snapshot = directory();
    snapshot.event_mut(EVENT).orgas.insert(3);
    let mut ml = draft(MailinglistType::EventOrga, "orga");
    ml.event_id = Some(EVENT);
    let ml_id = create_list(&conn, &snapshot, &ml);
    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([(3, SubscriptionState::Implicit)])
    );

    snapshot.event_mut(EVENT).orgas.insert(4);
    let report = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot))
        .write_subscription_states(&list_admin(), Some(&[ml_id]))
        .unwrap();
    assert_eq!(report.affected, 1);
    assert_eq!(
        states(&conn, &snapshot, ml_id),
        BTreeMap::from([
            (3, SubscriptionState::Implicit),
            (4, SubscriptionState::Implicit),
        ])
    );
}

#[test]
fn approved_and_invited_subscribers_survive_reconciliation() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let moderated = create_list(
        &conn,
        &snapshot,
        &draft(MailinglistType::GeneralModeratedOptIn, "council"),
    );
    let invited = create_list(
        &conn,
        &snapshot,
        &draft(MailinglistType::GeneralInvitationOnly, "board"),
    );
    let service = SubscriptionService::new(&conn, Collaborators::from_single(&snapshot));
    let moderator = user(MODERATOR, Role::Ml);

    service
        .do_subscription_action(
            &user(LIST_USER, Role::Ml),
            SubscriptionRequest::new(SubscriptionAction::RequestSubscription, moderated),
        )
        .unwrap();
    let report = service
        .do_subscription_actions(
            &moderator,
            &[
                SubscriptionRequest::new(SubscriptionAction::ApproveRequest, moderated)
                    .for_persona(LIST_USER),
                SubscriptionRequest::new(SubscriptionAction::AddSubscriber, invited)
                    .for_persona(LIST_USER),
            ],
        )
        .unwrap();
    assert_eq!(report.affected, 2);

    let report = ReconciliationService::new(&conn, Collaborators::from_single(&snapshot))
        .write_subscription_states(&User::automation(), None)
        .unwrap();
    assert_eq!(report.affected, 0);
    for ml_id in [moderated, invited] {
        assert_eq!(
            states(&conn, &snapshot, ml_id),
            BTreeMap::from([(LIST_USER, SubscriptionState::Subscribed)])
        );
        assert_eq!(
            count_code(&log_codes(&conn, &snapshot, ml_id), LogCode::AutomaticallyRemoved),
            0
        );
    }
}
