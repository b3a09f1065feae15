//! Identity query engine: predicates, sorting and pagination.

use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use idm_core::PaginationMode;
use idm_model::{Group, IdentityType, Partition, Relationship, User};
use idm_storage::{IdentityParameter, IdentityQuery, Page, QueryValue, Sort, StorageError};

use crate::common::{logins, names, TestEnv, STORES};

fn person(login: &str, first: &str, last: &str, email: &str) -> IdentityType {
    IdentityType::new(
        User::new(login)
            .with_first_name(first)
            .with_last_name(last)
            .with_email(email),
    )
}

#[tokio::test]
async fn user_fields_and_role_combine() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let alice = env.add(person("alice", "Alice", "A", "a@x.com")).await?;
        let bob = env.add(person("bob", "Alice", "A", "b@x.com")).await?;
        let admin = env.add(IdentityType::role("admin")).await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::grant(&alice, &admin))
            .await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::grant(&bob, &env.add(IdentityType::role("dev")).await?))
            .await?;

        let query = IdentityQuery::users()
            .with(IdentityParameter::LoginName, "alice")
            .with(IdentityParameter::FirstName, "Alice")
            .with(IdentityParameter::LastName, "A")
            .with(IdentityParameter::Email, "a@x.com")
            .with(IdentityParameter::HasRole, "admin");
        let found = env.manager.fetch_identities(&env.ctx, &query).await?;

        assert_eq!(logins(&found), ["alice"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn conjunction_equals_intersection() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.add(person("ann", "Ann", "Lee", "ann@x.com")).await?;
        env.add(person("ben", "Ben", "Lee", "ben@x.com")).await?;
        env.add(person("cat", "Ann", "Kim", "cat@x.com")).await?;
        env.add(person("dan", "Dan", "Kim", "dan@x.com").with_enabled(false)).await?;

        let fetch = |query: IdentityQuery| {
            let env = &env;
            async move {
                let found = env.manager.fetch_identities(&env.ctx, &query).await?;
                anyhow::Ok(
                    found
                        .iter()
                        .filter_map(|i| i.id)
                        .collect::<BTreeSet<_>>(),
                )
            }
        };

        let by_first = fetch(IdentityQuery::users().with(IdentityParameter::FirstName, "Ann")).await?;
        let by_last = fetch(IdentityQuery::users().with(IdentityParameter::LastName, "Kim")).await?;
        let both = fetch(
            IdentityQuery::users()
                .with(IdentityParameter::FirstName, "Ann")
                .with(IdentityParameter::LastName, "Kim"),
        )
        .await?;

        let expected: BTreeSet<_> = by_first.intersection(&by_last).copied().collect();
        assert_eq!(both, expected, "{store}");
        assert_eq!(both.len(), 1, "{store}");

        let enabled = fetch(IdentityQuery::users().with(IdentityParameter::Enabled, true)).await?;
        assert_eq!(enabled.len(), 3, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn membership_matches_exact_group_only() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let parent = env.add(IdentityType::group("parent")).await?;
        let child = env
            .add(IdentityType::new(Group::new("child").with_parent(&parent)))
            .await?;
        let alice = env.add(IdentityType::user("alice")).await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::group_membership(&alice, &child))
            .await?;

        let of_child = IdentityQuery::users().with(IdentityParameter::MemberOf, &child);
        let of_parent = IdentityQuery::users().with(IdentityParameter::MemberOf, &parent);

        assert_eq!(
            logins(&env.manager.fetch_identities(&env.ctx, &of_child).await?),
            ["alice"],
            "{store}"
        );
        assert!(env.manager.fetch_identities(&env.ctx, &of_parent).await?.is_empty(), "{store}");

        let has_member = IdentityQuery::groups().with(IdentityParameter::HasMember, &alice);
        let groups = env.manager.fetch_identities(&env.ctx, &has_member).await?;
        assert_eq!(names(&groups), ["child"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn group_role_is_inherited_by_subgroups() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let parent = env.add(IdentityType::group("eng")).await?;
        let child = env
            .add(IdentityType::new(Group::new("web").with_parent(&parent)))
            .await?;
        let lead = env.add(IdentityType::role("lead")).await?;
        let alice = env.add(IdentityType::user("alice")).await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::group_role(&alice, &parent, &lead))
            .await?;

        let via_child = IdentityQuery::users()
            .with(IdentityParameter::HasGroupRole, QueryValue::group_role(&child, &lead));
        let found = env.manager.fetch_identities(&env.ctx, &via_child).await?;
        assert_eq!(logins(&found), ["alice"], "{store}");

        let by_path = IdentityQuery::users()
            .with(IdentityParameter::HasGroupRole, QueryValue::group_role("/eng/web", "lead"));
        assert_eq!(env.manager.count_identities(&env.ctx, &by_path).await?, 1, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn role_of_and_parent_filters() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let alice = env.add(IdentityType::user("alice")).await?;
        let admin = env.add(IdentityType::role("admin")).await?;
        env.add(IdentityType::role("viewer")).await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::grant(&alice, &admin))
            .await?;

        let roles = env
            .manager
            .fetch_identities(&env.ctx, &IdentityQuery::roles().with(IdentityParameter::RoleOf, "alice"))
            .await?;
        assert_eq!(names(&roles), ["admin"], "{store}");

        let eng = env.add(IdentityType::group("eng")).await?;
        env.add(IdentityType::new(Group::new("web").with_parent(&eng))).await?;
        env.add(IdentityType::group("sales")).await?;
        let children = env
            .manager
            .fetch_identities(&env.ctx, &IdentityQuery::groups().with(IdentityParameter::Parent, "eng"))
            .await?;
        assert_eq!(names(&children), ["web"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn attribute_queries_require_every_value() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.add(
            IdentityType::user("alice")
                .with_attribute("langs", idm_model::AttributeValue::multi(["rust", "go"])),
        )
        .await?;
        env.add(IdentityType::user("bob").with_attribute("langs", "rust")).await?;
        env.add(IdentityType::user("carol")).await?;

        let rust = IdentityQuery::users()
            .with(IdentityParameter::attribute("langs"), "rust")
            .sorted_by(Sort::ascending([IdentityParameter::LoginName]));
        let both = IdentityQuery::users().with_values(
            IdentityParameter::attribute("langs"),
            [QueryValue::from("rust"), QueryValue::from("go")],
        );

        assert_eq!(logins(&env.manager.fetch_identities(&env.ctx, &rust).await?), ["alice", "bob"], "{store}");
        assert_eq!(logins(&env.manager.fetch_identities(&env.ctx, &both).await?), ["alice"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn expiry_filters_skip_identities_without_expiry() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let now = Utc::now();
        env.add(IdentityType::user("soon").with_expiration_date(now + Duration::days(1))).await?;
        env.add(IdentityType::user("later").with_expiration_date(now + Duration::days(30))).await?;
        env.add(IdentityType::user("never")).await?;

        let before = IdentityQuery::users().with(IdentityParameter::ExpiryBefore, now + Duration::days(7));
        let after = IdentityQuery::users().with(IdentityParameter::ExpiryAfter, now);

        assert_eq!(logins(&env.manager.fetch_identities(&env.ctx, &before).await?), ["soon"], "{store}");
        assert_eq!(env.manager.count_identities(&env.ctx, &after).await?, 2, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn partition_parameter_spans_realms() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.add(IdentityType::user("alice")).await?;
        let other = env.manager.create_partition(Partition::realm("other")).await?;
        let other_ctx = env.manager.context(other.clone())?;
        env.manager
            .add_identity(&other_ctx, IdentityType::user("bob"))
            .await?;

        let both = IdentityQuery::users()
            .with_values(
                IdentityParameter::Partition,
                [QueryValue::from(env.ctx.partition()), QueryValue::from(&other)],
            )
            .sorted_by(Sort::ascending([IdentityParameter::LoginName]));
        let found = env.manager.fetch_identities(&env.ctx, &both).await?;
        assert_eq!(logins(&found), ["alice", "bob"], "{store}");

        let own = env.manager.fetch_identities(&env.ctx, &IdentityQuery::users()).await?;
        assert_eq!(logins(&own), ["alice"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn repeated_partition_values_return_each_identity_once() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.add(IdentityType::user("alice")).await?;
        let other = env.manager.create_partition(Partition::realm("other")).await?;

        let query = IdentityQuery::users().with_values(
            IdentityParameter::Partition,
            [
                QueryValue::from(env.ctx.partition()),
                QueryValue::from(&other),
                QueryValue::from(env.ctx.partition()),
            ],
        );
        let found = env.manager.fetch_identities(&env.ctx, &query).await?;
        assert_eq!(logins(&found), ["alice"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn sorting_happens_before_paging() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        for login in ["delta", "alpha", "echo", "charlie", "bravo"] {
            env.add(IdentityType::user(login)).await?;
        }

        let page = IdentityQuery::users()
            .sorted_by(Sort::ascending([IdentityParameter::LoginName]))
            .with_page(Page::new(1, 2));
        let desc = IdentityQuery::users()
            .sorted_by(Sort::descending([IdentityParameter::LoginName]))
            .with_page(Page::first(2));

        assert_eq!(logins(&env.manager.fetch_identities(&env.ctx, &page).await?), ["bravo", "charlie"], "{store}");
        assert_eq!(logins(&env.manager.fetch_identities(&env.ctx, &desc).await?), ["echo", "delta"], "{store}");
        assert_eq!(env.manager.count_identities(&env.ctx, &page).await?, 5, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn pagination_modes_differ_on_filtered_pages() -> anyhow::Result<()> {
    for store in STORES {
        for mode in [PaginationMode::FilteredResults, PaginationMode::CandidateCount] {
            let env = TestEnv::with_pagination(store, mode).await?;
            env.add(IdentityType::user("u1")).await?;
            env.add(IdentityType::user("u2").with_enabled(false)).await?;
            env.add(IdentityType::user("u3")).await?;
            env.add(IdentityType::user("u4")).await?;

            let query = IdentityQuery::users()
                .with(IdentityParameter::Enabled, true)
                .sorted_by(Sort::ascending([IdentityParameter::LoginName]))
                .with_page(Page::first(2));
            let found = env.manager.fetch_identities(&env.ctx, &query).await?;

            let expected: &[&str] = match mode {
                PaginationMode::FilteredResults => &["u1", "u3"],
                PaginationMode::CandidateCount => &["u1"],
            };
            assert_eq!(logins(&found), expected, "{store} {mode:?}");
            assert_eq!(env.manager.count_identities(&env.ctx, &query).await?, 3, "{store} {mode:?}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn unbounded_limit_with_offset_pages_safely() -> anyhow::Result<()> {
    for store in STORES {
        for mode in [PaginationMode::FilteredResults, PaginationMode::CandidateCount] {
            let env = TestEnv::with_pagination(store, mode).await?;
            for login in ["u1", "u2", "u3"] {
                env.add(IdentityType::user(login)).await?;
            }

            let query = IdentityQuery::users()
                .sorted_by(Sort::ascending([IdentityParameter::LoginName]))
                .with_page(Page::new(1, usize::MAX));
            let found = env.manager.fetch_identities(&env.ctx, &query).await?;
            assert_eq!(logins(&found), ["u2", "u3"], "{store} {mode:?}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn parameters_outside_the_class_are_rejected() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;

        let err = env
            .manager
            .fetch_identities(&env.ctx, &IdentityQuery::roles().with(IdentityParameter::LoginName, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedQueryParameter { .. }), "{store}");

        let err = env
            .manager
            .fetch_identities(
                &env.ctx,
                &IdentityQuery::users().sorted_by(Sort::ascending([IdentityParameter::HasRole])),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedSortKey(_)), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn any_class_query_spans_identity_kinds() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.add(IdentityType::user("ops")).await?;
        env.add(IdentityType::group("ops")).await?;
        env.add(IdentityType::role("ops")).await?;
        env.add(IdentityType::role("dev")).await?;

        let named = IdentityQuery::any().with(IdentityParameter::Name, "ops");
        let found = env.manager.fetch_identities(&env.ctx, &named).await?;
        let mut kinds: Vec<_> = found.iter().map(IdentityType::type_name).collect();
        kinds.sort_unstable();

        assert_eq!(kinds, ["Group", "Role"], "{store}");
        assert_eq!(env.manager.count_identities(&env.ctx, &IdentityQuery::any()).await?, 4, "{store}");
    }
    Ok(())
}
