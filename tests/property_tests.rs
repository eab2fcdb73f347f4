//! Property checks for naming and policy merging.

use cloud_deploy_core::naming::{
    generate_project_id, sanitize_name, validate_project_id, ResourceNames, CLUSTER_NAME_MAX,
    DATABASE_INSTANCE_NAME_MAX, DATABASE_NAME_MAX,
};
use cloud_deploy_core::policy::PolicyDocument;
use proptest::prelude::*;

proptest! {
    #[test]
    fn sanitizing_is_idempotent(name in "[A-Za-z0-9_ -]{0,40}") {
        let once = sanitize_name(&name);
        prop_assert_eq!(sanitize_name(&once), once.clone());
        prop_assert!(!once.contains('_'));
        prop_assert!(!once.chars().any(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn derived_names_fit_provider_limits(app in "[A-Za-z0-9_-]{1,120}") {
        let names = ResourceNames::derive("demo-123456", &app, None);
        prop_assert!(names.cluster.chars().count() <= CLUSTER_NAME_MAX, "{}", names.cluster);
        prop_assert!(!names.cluster.ends_with('-'), "{}", names.cluster);
        prop_assert!(names.database.chars().count() <= DATABASE_NAME_MAX);
        prop_assert!(names.database.ends_with("-db"));
        prop_assert!(names.database_instance.chars().count() <= DATABASE_INSTANCE_NAME_MAX);
        prop_assert!(names.database_instance.ends_with("-instance"));
    }

    #[test]
    fn generated_project_ids_are_always_valid(name in "\\PC{0,60}") {
        let id = generate_project_id(&name);
        prop_assert!(id.len() <= 30, "{} is too long", id);
        prop_assert!(validate_project_id(&id).is_ok(), "{} was rejected", id);
    }

    #[test]
    fn merging_a_member_twice_changes_nothing(
        member in "user:[a-z]{1,10}@example\\.com",
        roles in proptest::collection::vec("roles/[a-z.]{1,12}", 1..5),
        existing in proptest::collection::vec(("roles/[a-z.]{1,12}", "user:[a-z]{1,8}"), 0..5),
    ) {
        let mut base = PolicyDocument::new();
        for (role, other) in &existing {
            base.add_member(role, other);
        }

        let once = base.clone().grant(&member, &roles);
        let twice = once.clone().grant(&member, &roles);
        prop_assert_eq!(&once, &twice);
        for role in &roles {
            prop_assert!(once.has_member(role, &member));
            prop_assert_eq!(
                once.members(role).iter().filter(|m| **m == member).count(),
                1
            );
        }
        for (role, other) in &existing {
            prop_assert!(once.has_member(role, other));
        }
    }

    #[test]
    fn resource_names_depend_only_on_their_inputs(
        project in "[a-z][a-z0-9-]{5,20}",
        app in "[A-Za-z][A-Za-z0-9_]{0,20}",
    ) {
        let first = ResourceNames::derive(&project, &app, None);
        let second = ResourceNames::derive(&project, &app, None);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.app_name.clone(), sanitize_name(&app));
        prop_assert_eq!(first.static_bucket.clone(), project.clone());
        prop_assert_eq!(first.secrets_bucket.clone(), format!("secrets-{project}"));
        prop_assert!(first.image_tag.ends_with(&first.app_name));
    }
}
