mod common;

use common::{
    count_code, create_list, directory, draft, event_draft, log_codes, states, user, LIST_USER,
    MEMBER, MODERATOR,
};
use mailinglist_core::{
    open_db_in_memory, Collaborators, EngineError, LogCode, LogQuery, MailinglistQuery,
    MailinglistService, MailinglistType, MailinglistUpdate, RegistrationStatus, Role,
    SubscriptionAction, SubscriptionRequest, SubscriptionService, SubscriptionState, User,
};
use std::collections::BTreeSet;

fn assert_privilege<T: std::fmt::Debug>(result: Result<T, EngineError>) {
    match result {
        Err(EngineError::Privilege(_)) => {}
        other => panic!("expected privilege error, got {other:?}"),
    }
}

#[test]
fn creating_lists_requires_type_admin() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));

    assert_privilege(service.create_mailinglist(
        &user(LIST_USER, Role::Ml),
        &draft(MailinglistType::GeneralOptIn, "announce"),
    ));

    let cde_admin = user(MEMBER, Role::CdeAdmin);
    assert_privilege(
        service.create_mailinglist(&cde_admin, &draft(MailinglistType::GeneralOptIn, "announce")),
    );
    let ml_id = service
        .create_mailinglist(&cde_admin, &draft(MailinglistType::MemberOptIn, "members"))
        .unwrap();

    let ml = service.get_mailinglist(&cde_admin, ml_id).unwrap();
    assert_eq!(ml.ml_type, MailinglistType::MemberOptIn);
    assert_eq!(ml.moderators, BTreeSet::from([MODERATOR]));
    assert_eq!(ml.maxsize, Some(2048));

    let codes = log_codes(&conn, &snapshot, ml_id);
    assert_eq!(count_code(&codes, LogCode::ListCreated), 1);
    assert_eq!(count_code(&codes, LogCode::ModeratorAdded), 1);
}

#[test]
fn duplicate_address_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    create_list(&conn, &snapshot, &draft(MailinglistType::GeneralOptIn, "announce"));

    let err = MailinglistService::new(&conn, Collaborators::from_single(&snapshot))
        .create_mailinglist(
            &User::automation(),
            &draft(MailinglistType::GeneralModeratedOptIn, "announce"),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidOperation(_)), "{err}");
}

#[test]
fn invalid_drafts_are_validation_errors() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));

    let mut general_with_stati = draft(MailinglistType::GeneralOptIn, "announce");
    general_with_stati
        .registration_stati
        .insert(RegistrationStatus::Participant);
    let err = service
        .create_mailinglist(&User::automation(), &general_with_stati)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err}");

    let mut no_moderators = draft(MailinglistType::GeneralOptIn, "announce");
    no_moderators.moderators.clear();
    let err = service
        .create_mailinglist(&User::automation(), &no_moderators)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err}");
}

#[test]
fn listing_is_limited_to_visible_types() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let general = create_list(&conn, &snapshot, &draft(MailinglistType::GeneralOptIn, "announce"));
    let members = create_list(&conn, &snapshot, &draft(MailinglistType::MemberOptIn, "members"));
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));

    let seen = service
        .list_mailinglists(&user(LIST_USER, Role::Ml), &MailinglistQuery::default())
        .unwrap();
    assert_eq!(seen.keys().copied().collect::<Vec<_>>(), vec![general]);

    let seen = service
        .list_mailinglists(&user(MEMBER, Role::Member), &MailinglistQuery::default())
        .unwrap();
    assert_eq!(seen.keys().copied().collect::<Vec<_>>(), vec![general, members]);
    assert_eq!(seen.get(&members).map(String::as_str), Some("List members"));

    let seen = service
        .list_mailinglists(
            &user(MEMBER, Role::Member),
            &MailinglistQuery {
                ml_types: vec![MailinglistType::MemberOptIn],
                ..MailinglistQuery::default()
            },
        )
        .unwrap();
    assert_eq!(seen.keys().copied().collect::<Vec<_>>(), vec![members]);

    assert_privilege(service.get_mailinglist(&user(LIST_USER, Role::Ml), members));
    assert!(service
        .get_mailinglist(&user(MODERATOR, Role::Ml), members)
        .is_ok());
}

#[test]
fn update_fields_follow_privilege_tiers() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &event_draft("party"));
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));
    let restricted = user(MODERATOR, Role::Event);
    let orga = User::new(MODERATOR, [Role::Event]).with_orga(common::EVENT);

    let retitle = MailinglistUpdate {
        title: Some("Party people".to_string()),
        ..MailinglistUpdate::default()
    };
    assert_eq!(service.set_mailinglist(&restricted, ml_id, &retitle).unwrap(), 1);
    assert_eq!(
        service.get_mailinglist(&restricted, ml_id).unwrap().title,
        "Party people"
    );

    let stati = MailinglistUpdate {
        registration_stati: Some(BTreeSet::from([
            RegistrationStatus::Participant,
            RegistrationStatus::Cancelled,
        ])),
        ..MailinglistUpdate::default()
    };
    assert_privilege(service.set_mailinglist(&restricted, ml_id, &stati));
    assert_eq!(service.set_mailinglist(&orga, ml_id, &stati).unwrap(), 2);
    assert_eq!(
        states(&conn, &snapshot, ml_id).get(&5),
        Some(&SubscriptionState::Implicit)
    );

    let deactivate = MailinglistUpdate {
        is_active: Some(false),
        ..MailinglistUpdate::default()
    };
    assert_privilege(service.set_mailinglist(&orga, ml_id, &deactivate));
    assert_eq!(
        service
            .set_mailinglist(&user(MEMBER, Role::EventAdmin), ml_id, &deactivate)
            .unwrap(),
        1
    );
    assert_eq!(
        service
            .set_mailinglist(&orga, ml_id, &MailinglistUpdate::default())
            .unwrap(),
        0
    );
}

#[test]
fn switching_to_mandatory_drops_unsubscriptions() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &draft(MailinglistType::GeneralOptIn, "announce"));
    let subscriptions = SubscriptionService::new(&conn, Collaborators::from_single(&snapshot));
    let persona = user(LIST_USER, Role::Ml);
    for action in [SubscriptionAction::Subscribe, SubscriptionAction::Unsubscribe] {
        subscriptions
            .do_subscription_action(&persona, SubscriptionRequest::new(action, ml_id))
            .unwrap();
    }
    assert_eq!(
        states(&conn, &snapshot, ml_id).get(&LIST_USER),
        Some(&SubscriptionState::Unsubscribed)
    );

    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));
    let to_mandatory = MailinglistUpdate {
        ml_type: Some(MailinglistType::GeneralMandatory),
        ..MailinglistUpdate::default()
    };
    assert_privilege(service.set_mailinglist(&user(MODERATOR, Role::Ml), ml_id, &to_mandatory));
    service
        .set_mailinglist(&User::automation(), ml_id, &to_mandatory)
        .unwrap();

    let after = states(&conn, &snapshot, ml_id);
    assert_eq!(after.get(&LIST_USER), Some(&SubscriptionState::Implicit));
    assert!(after
        .values()
        .all(|state| *state == SubscriptionState::Implicit));
}

#[test]
fn deletion_is_blocked_until_cascaded() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(
        &conn,
        &snapshot,
        &draft(MailinglistType::GeneralMandatory, "everyone"),
    );
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));

    assert_privilege(service.delete_mailinglist(&user(MODERATOR, Role::Ml), ml_id, true));

    let err = service
        .delete_mailinglist(&User::automation(), ml_id, false)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidOperation(_)), "{err}");
    assert!(err.to_string().contains("subscriptions"), "{err}");

    let removed = service
        .delete_mailinglist(&User::automation(), ml_id, true)
        .unwrap();
    assert!(removed.subscriptions > 0);
    assert!(removed.log > 0);

    let err = service
        .get_mailinglist(&User::automation(), ml_id)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(id) if id == ml_id), "{err}");

    let global = service
        .retrieve_log(&User::automation(), &LogQuery::default())
        .unwrap();
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].code, LogCode::ListDeleted);
    assert_eq!(global[0].mailinglist_id, None);
    assert_eq!(global[0].change_note.as_deref(), Some("everyone@lists.example.org"));
}

#[test]
fn moderators_can_be_managed_but_not_emptied() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &draft(MailinglistType::GeneralOptIn, "announce"));
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));
    let moderator = user(MODERATOR, Role::Ml);

    let err = service
        .remove_moderator(&moderator, ml_id, MODERATOR)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidOperation(_)), "{err}");

    assert_eq!(
        service
            .add_moderators(&moderator, ml_id, &BTreeSet::from([MODERATOR, LIST_USER]))
            .unwrap(),
        1
    );
    assert_eq!(service.remove_moderator(&moderator, ml_id, MEMBER).unwrap(), 0);
    assert_eq!(service.remove_moderator(&moderator, ml_id, MODERATOR).unwrap(), 1);
    assert_eq!(
        service.get_mailinglist(&moderator, ml_id).unwrap().moderators,
        BTreeSet::from([LIST_USER])
    );
    assert_privilege(service.add_moderators(&moderator, ml_id, &BTreeSet::from([MEMBER])));

    let codes = log_codes(&conn, &snapshot, ml_id);
    assert_eq!(count_code(&codes, LogCode::ModeratorAdded), 2);
    assert_eq!(count_code(&codes, LogCode::ModeratorRemoved), 1);
}

#[test]
fn whitelist_entries_are_validated_and_logged() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &draft(MailinglistType::GeneralOptIn, "announce"));
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));
    let moderator = user(MODERATOR, Role::Ml);

    let err = service
        .add_whitelist_entry(&moderator, ml_id, "nobody")
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidOperation(_)), "{err}");

    assert_eq!(
        service
            .add_whitelist_entry(&moderator, ml_id, "guest@example.org")
            .unwrap(),
        1
    );
    assert_eq!(
        service
            .add_whitelist_entry(&moderator, ml_id, "guest@example.org")
            .unwrap(),
        0
    );
    assert!(service
        .get_mailinglist(&moderator, ml_id)
        .unwrap()
        .whitelist
        .contains("guest@example.org"));
    assert_eq!(
        service
            .remove_whitelist_entry(&moderator, ml_id, "guest@example.org")
            .unwrap(),
        1
    );
    assert_privilege(service.add_whitelist_entry(
        &user(LIST_USER, Role::Ml),
        ml_id,
        "other@example.org",
    ));

    let codes = log_codes(&conn, &snapshot, ml_id);
    assert_eq!(count_code(&codes, LogCode::WhitelistAdded), 1);
    assert_eq!(count_code(&codes, LogCode::WhitelistRemoved), 1);
}

#[test]
fn log_access_is_scoped_to_moderated_lists() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = directory();
    let ml_id = create_list(&conn, &snapshot, &draft(MailinglistType::GeneralOptIn, "announce"));
    let service = MailinglistService::new(&conn, Collaborators::from_single(&snapshot));

    assert_privilege(service.retrieve_log(&user(MODERATOR, Role::Ml), &LogQuery::default()));
    assert_privilege(service.retrieve_log(
        &user(LIST_USER, Role::Ml),
        &LogQuery {
            mailinglist_ids: vec![ml_id],
            ..LogQuery::default()
        },
    ));

    let entries = service
        .retrieve_log(
            &user(MODERATOR, Role::Ml),
            &LogQuery {
                mailinglist_ids: vec![ml_id],
                codes: vec![LogCode::ModeratorAdded],
                ..LogQuery::default()
            },
        )
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].persona_id, Some(MODERATOR));
    assert_eq!(entries[0].submitted_by, None);
}
