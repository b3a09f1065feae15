//! Identity operations: add, update, remove, lookups, and attribute helpers.

use std::collections::HashSet;

use idm_core::EventType;
use idm_model::{AttributeValue, IdentityClass, IdentityKind, IdentityType};
use idm_spi::IdentityContext;
use idm_storage::{Region, StorageError, StorageResult, TypeKey, WriteBatch};
use uuid::Uuid;

use crate::manager::IdentityManager;
use crate::view::StoreView;

/// Region holding an identity of this kind in `partition`.
pub(crate) const fn identity_region(kind: &IdentityKind, partition: Uuid) -> Region {
    match kind {
        IdentityKind::Agent(_) | IdentityKind::User(_) => Region::Agents(partition),
        IdentityKind::Group(_) => Region::Groups(partition),
        IdentityKind::Role(_) => Region::Roles(partition),
    }
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Created,
    Updated,
    Deleted,
}

const fn identity_event(class: IdentityClass, change: Change) -> EventType {
    match (class, change) {
        (IdentityClass::User, Change::Created) => EventType::UserCreated,
        (IdentityClass::User, Change::Updated) => EventType::UserUpdated,
        (IdentityClass::User, Change::Deleted) => EventType::UserDeleted,
        (IdentityClass::Group, Change::Created) => EventType::GroupCreated,
        (IdentityClass::Group, Change::Updated) => EventType::GroupUpdated,
        (IdentityClass::Group, Change::Deleted) => EventType::GroupDeleted,
        (IdentityClass::Role, Change::Created) => EventType::RoleCreated,
        (IdentityClass::Role, Change::Updated) => EventType::RoleUpdated,
        (IdentityClass::Role, Change::Deleted) => EventType::RoleDeleted,
        (_, Change::Created) => EventType::AgentCreated,
        (_, Change::Updated) => EventType::AgentUpdated,
        (_, Change::Deleted) => EventType::AgentDeleted,
    }
}

fn stored_partition(identity: &IdentityType) -> StorageResult<Uuid> {
    identity
        .partition_id
        .ok_or_else(|| StorageError::mapping(format!("{} has no partition", identity.type_name())))
}

/// Rewrites the paths of every group below `root`, which already carries
/// its new path.
fn repath_descendants(groups: &[IdentityType], root: &IdentityType) -> Vec<IdentityType> {
    let mut changed = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(current) = stack.pop() {
        let (Some(id), Some(parent)) = (current.id, current.as_group()) else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        for child in groups
            .iter()
            .filter(|g| g.as_group().is_some_and(|c| c.parent_id == Some(id)))
        {
            let mut child = child.clone();
            if let Some(group) = child.as_group_mut() {
                group.path = format!("{}/{}", parent.path, group.name);
            }
            changed.push(child.clone());
            stack.push(child);
        }
    }
    changed
}

impl IdentityManager {
    /// Adds an identity to the context's partition.
    ///
    /// The identity gets a new id. A group's path is derived from its
    /// stored parent.
    ///
    /// ## Errors
    ///
    /// Returns a validation error for a missing required field or an agent
    /// outside a realm, `AlreadyExists` for a login name or name already
    /// used in the partition, `NotFound` for an unknown parent group, and
    /// `UnsupportedIdentityType` if the type has no mapping.
    pub async fn add_identity(
        &self,
        ctx: &IdentityContext,
        mut identity: IdentityType,
    ) -> StorageResult<IdentityType> {
        identity.validate()?;
        self.registry
            .resolve_mapper(TypeKey::for_identity(&identity.kind))?;

        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let partition_id = ctx.partition_id();
        let partition = view
            .partition(partition_id)
            .await?
            .ok_or_else(|| StorageError::not_found("Partition", partition_id))?;
        if identity.is_agent() && !partition.is_realm() {
            return Err(StorageError::validation(format!(
                "{} '{}' must be stored in a realm, not tier '{}'",
                identity.type_name(),
                identity.login_name().unwrap_or_default(),
                partition.name
            )));
        }

        let id = Uuid::now_v7();
        identity.id = Some(id);
        identity.partition_id = Some(partition_id);
        check_unique(&mut view, partition_id, &identity).await?;
        if identity.as_group().is_some() {
            place_group(&mut view, partition_id, &mut identity).await?;
        }

        let region = identity_region(&identity.kind, partition_id);
        let mut batch = WriteBatch::new();
        batch.put(region, self.registry.dematerialize(&identity)?);
        self.commit(batch).await?;

        tracing::info!(partition = %partition_id, identity = %id, kind = identity.type_name(), "identity added");
        self.raise(
            identity_event(identity.class(), Change::Created),
            Some(partition_id),
            Some(id),
            Some(ctx),
        );
        Ok(identity)
    }

    /// Replaces a stored identity's fields and attribute set.
    ///
    /// The id, partition, and creation date are kept. Renaming or moving a
    /// group rewrites the paths of its descendants.
    ///
    /// ## Errors
    ///
    /// Returns a validation error for an identity without an id or with a
    /// different type than stored, `NotFound` if it is not stored, and
    /// `AlreadyExists` for a clashing login name or name.
    pub async fn update_identity(
        &self,
        ctx: &IdentityContext,
        identity: IdentityType,
    ) -> StorageResult<IdentityType> {
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        self.apply_update(&mut view, ctx, identity).await
    }

    async fn apply_update(
        &self,
        view: &mut StoreView<'_>,
        ctx: &IdentityContext,
        mut identity: IdentityType,
    ) -> StorageResult<IdentityType> {
        let id = identity
            .id
            .ok_or_else(|| StorageError::validation(format!("{} has no id", identity.type_name())))?;
        let stored = view
            .identity(id)
            .await?
            .ok_or_else(|| StorageError::not_found(identity.type_name(), id))?;
        if stored.class() != identity.class() {
            return Err(StorageError::validation(format!(
                "cannot change {} {id} into {}",
                stored.type_name(),
                identity.type_name()
            )));
        }
        identity.validate()?;

        let partition_id = stored_partition(&stored)?;
        identity.partition_id = Some(partition_id);
        identity.created_date = stored.created_date;
        check_unique(view, partition_id, &identity).await?;

        let region = identity_region(&identity.kind, partition_id);
        let mut batch = WriteBatch::new();
        if identity.as_group().is_some() {
            place_group(view, partition_id, &mut identity).await?;
            let moved = stored.as_group().map(|g| &g.path) != identity.as_group().map(|g| &g.path);
            if moved {
                let groups = view.identities(region).await?;
                for child in repath_descendants(&groups, &identity) {
                    batch.put(region, self.registry.dematerialize(&child)?);
                }
            }
        }
        batch.put(region, self.registry.dematerialize(&identity)?);
        self.commit(batch).await?;

        tracing::info!(partition = %partition_id, identity = %id, kind = identity.type_name(), "identity updated");
        self.raise(
            identity_event(identity.class(), Change::Updated),
            Some(partition_id),
            Some(id),
            Some(ctx),
        );
        Ok(identity)
    }

    /// Removes a stored identity.
    ///
    /// Relationships referencing it and, for agents, its credential history
    /// are removed with it. Child groups of a removed group become
    /// top-level groups.
    ///
    /// ## Errors
    ///
    /// Returns a validation error for an identity without an id and
    /// `NotFound` if it is not stored.
    pub async fn remove_identity(
        &self,
        ctx: &IdentityContext,
        identity: &IdentityType,
    ) -> StorageResult<()> {
        let id = identity
            .id
            .ok_or_else(|| StorageError::validation(format!("{} has no id", identity.type_name())))?;
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let stored = view
            .identity(id)
            .await?
            .ok_or_else(|| StorageError::not_found(identity.type_name(), id))?;
        let partition_id = stored_partition(&stored)?;
        let region = identity_region(&stored.kind, partition_id);

        let mut batch = WriteBatch::new();
        batch.delete(region, id);

        let mut relationships = 0usize;
        for relationship in view.relationships().await?.iter().filter(|r| r.involves(id)) {
            batch.delete(Region::Relationships, relationship.id);
            relationships += 1;
        }

        let mut credentials = 0usize;
        if stored.is_agent() {
            for record in view
                .credentials(partition_id)
                .await?
                .iter()
                .filter(|c| c.owner_agent_id == Some(id))
            {
                batch.delete(Region::Credentials(partition_id), record.id);
                credentials += 1;
            }
        }

        if stored.as_group().is_some() {
            let groups = view.identities(region).await?;
            for child in groups
                .iter()
                .filter(|g| g.as_group().is_some_and(|c| c.parent_id == Some(id)))
            {
                let mut detached = child.clone();
                if let Some(group) = detached.as_group_mut() {
                    group.parent_id = None;
                    group.path = format!("/{}", group.name);
                }
                for descendant in repath_descendants(&groups, &detached) {
                    batch.put(region, self.registry.dematerialize(&descendant)?);
                }
                batch.put(region, self.registry.dematerialize(&detached)?);
            }
        }
        self.commit(batch).await?;

        tracing::info!(
            partition = %partition_id,
            identity = %id,
            kind = stored.type_name(),
            relationships,
            credentials,
            "identity removed"
        );
        self.raise(
            identity_event(stored.class(), Change::Deleted),
            Some(partition_id),
            Some(id),
            Some(ctx),
        );
        Ok(())
    }

    // === Lookups ===

    /// Looks up an identity in any partition.
    ///
    /// ## Errors
    ///
    /// Returns an error if a region cannot be read.
    pub async fn lookup_identity_by_id(&self, id: Uuid) -> StorageResult<Option<IdentityType>> {
        self.snapshot_view().await?.identity(id).await
    }

    /// Finds an agent or user by login name in the context's partition.
    ///
    /// ## Errors
    ///
    /// Returns an error if the agent region cannot be read.
    pub async fn get_agent(
        &self,
        ctx: &IdentityContext,
        login_name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        self.snapshot_view().await?.find_agent(ctx.partition_id(), login_name).await
    }

    /// Finds a user by login name in the context's partition.
    ///
    /// ## Errors
    ///
    /// Returns an error if the agent region cannot be read.
    pub async fn get_user(
        &self,
        ctx: &IdentityContext,
        login_name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        Ok(self
            .get_agent(ctx, login_name)
            .await?
            .filter(|a| a.as_user().is_some()))
    }

    /// Finds a role by name, walking up the tier chain.
    ///
    /// ## Errors
    ///
    /// Returns an error if a region cannot be read.
    pub async fn get_role(
        &self,
        ctx: &IdentityContext,
        name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        self.snapshot_view().await?.find_role(ctx.partition_id(), name).await
    }

    /// Finds a group by path (`/parent/child`) or name, walking up the tier
    /// chain.
    ///
    /// ## Errors
    ///
    /// Returns an error if a region cannot be read.
    pub async fn get_group(
        &self,
        ctx: &IdentityContext,
        path_or_name: &str,
    ) -> StorageResult<Option<IdentityType>> {
        self.snapshot_view().await?.find_group(ctx.partition_id(), path_or_name).await
    }

    /// Finds the child group `name` under `parent`.
    ///
    /// ## Errors
    ///
    /// Returns a validation error if `parent` has no id.
    pub async fn get_group_in(
        &self,
        ctx: &IdentityContext,
        name: &str,
        parent: &IdentityType,
    ) -> StorageResult<Option<IdentityType>> {
        let parent_id = parent
            .id
            .ok_or_else(|| StorageError::validation("parent group has no id"))?;
        let mut view = self.snapshot_view().await?;
        for scope in view.partition_chain(ctx.partition_id()).await? {
            let groups = view.identities(Region::Groups(scope)).await?;
            let found = groups.iter().find(|g| {
                g.as_group()
                    .is_some_and(|group| group.name == name && group.parent_id == Some(parent_id))
            });
            if let Some(group) = found {
                return Ok(Some(group.clone()));
            }
        }
        Ok(None)
    }

    // === Attributes ===

    /// Sets an attribute on a stored identity, replacing prior values.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the identity is not stored and a validation
    /// error for an invalid value.
    pub async fn set_attribute(
        &self,
        ctx: &IdentityContext,
        identity: &IdentityType,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> StorageResult<IdentityType> {
        let id = identity
            .id
            .ok_or_else(|| StorageError::validation(format!("{} has no id", identity.type_name())))?;
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let mut stored = view
            .identity(id)
            .await?
            .ok_or_else(|| StorageError::not_found(identity.type_name(), id))?;
        stored.attributes.set(name, value);
        self.apply_update(&mut view, ctx, stored).await
    }

    /// Removes an attribute from a stored identity.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the identity is not stored.
    pub async fn remove_attribute(
        &self,
        ctx: &IdentityContext,
        identity: &IdentityType,
        name: &str,
    ) -> StorageResult<IdentityType> {
        let id = identity
            .id
            .ok_or_else(|| StorageError::validation(format!("{} has no id", identity.type_name())))?;
        let guard = self.lock().await;
        let mut view = self.locked_view(&guard);
        let mut stored = view
            .identity(id)
            .await?
            .ok_or_else(|| StorageError::not_found(identity.type_name(), id))?;
        stored.attributes.remove(name);
        self.apply_update(&mut view, ctx, stored).await
    }

    /// Reads an attribute of a stored identity.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the identity is not stored.
    pub async fn get_attribute(
        &self,
        identity_id: Uuid,
        name: &str,
    ) -> StorageResult<Option<AttributeValue>> {
        let stored = self
            .snapshot_view()
            .await?
            .identity(identity_id)
            .await?
            .ok_or_else(|| StorageError::not_found("IdentityType", identity_id))?;
        Ok(stored.attributes.get(name).cloned())
    }
}

/// Rejects a login name or name already used by another identity of the
/// same region.
async fn check_unique(
    view: &mut StoreView<'_>,
    partition: Uuid,
    identity: &IdentityType,
) -> StorageResult<()> {
    let existing = view.identities(identity_region(&identity.kind, partition)).await?;
    let others = existing.iter().filter(|e| e.id != identity.id);
    if let Some(login_name) = identity.login_name() {
        if others.clone().any(|e| e.login_name() == Some(login_name)) {
            return Err(StorageError::already_exists(
                identity.type_name(),
                "login_name",
                login_name,
            ));
        }
    }
    if let Some(name) = identity.name() {
        if others.clone().any(|e| e.name() == Some(name)) {
            return Err(StorageError::already_exists(identity.type_name(), "name", name));
        }
    }
    Ok(())
}

/// Resolves a group's parent in `partition` and derives its path.
async fn place_group(
    view: &mut StoreView<'_>,
    partition: Uuid,
    identity: &mut IdentityType,
) -> StorageResult<()> {
    let id = identity.id;
    let Some(group) = identity.as_group_mut() else {
        return Ok(());
    };
    let Some(parent_id) = group.parent_id else {
        group.path = format!("/{}", group.name);
        return Ok(());
    };
    let groups = view.identities(Region::Groups(partition)).await?;
    let parent = groups
        .iter()
        .find(|g| g.id == Some(parent_id))
        .and_then(IdentityType::as_group)
        .ok_or_else(|| StorageError::not_found("Group", parent_id))?;
    if let Some(id) = id {
        if view.group_lineage(parent_id).await?.contains(&id) {
            return Err(StorageError::validation(format!(
                "group '{}' cannot be placed below itself",
                group.name
            )));
        }
    }
    group.path = format!("{}/{}", parent.path, group.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use idm_core::event::InMemoryEventBridge;
    use idm_core::FileStoreConfig;
    use idm_model::{Group, Partition, Relationship, User};
    use idm_storage_file::FileBackend;
    use tempfile::TempDir;

    use super::*;

    async fn setup(dir: &TempDir) -> (IdentityManager, IdentityContext, Arc<InMemoryEventBridge>) {
        let backend = FileBackend::open(&FileStoreConfig::new(dir.path())).await.unwrap();
        let events = Arc::new(InMemoryEventBridge::new());
        let manager = IdentityManager::builder(Arc::new(backend))
            .with_events(events.clone())
            .build();
        let ctx = manager.default_context().await.unwrap();
        (manager, ctx, events)
    }

    #[tokio::test]
    async fn add_assigns_id_and_partition() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, events) = setup(&dir).await;

        let alice = manager
            .add_identity(&ctx, IdentityType::user("alice"))
            .await
            .unwrap();

        assert!(alice.id.is_some());
        assert_eq!(alice.partition_id, Some(ctx.partition_id()));
        assert_eq!(
            manager.lookup_identity_by_id(alice.id.unwrap()).await.unwrap(),
            Some(alice)
        );
        assert!(events.event_types().contains(&EventType::UserCreated));
    }

    #[tokio::test]
    async fn login_name_is_unique_across_agents_and_users() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;

        manager.add_identity(&ctx, IdentityType::agent("bot")).await.unwrap();
        let err = manager
            .add_identity(&ctx, IdentityType::user("bot"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn agents_live_in_realms_only() {
        let dir = TempDir::new().unwrap();
        let (manager, _, _) = setup(&dir).await;
        let tier = manager.create_partition(Partition::tier("t1")).await.unwrap();
        let tier_ctx = manager.context(tier).unwrap();

        assert!(matches!(
            manager.add_identity(&tier_ctx, IdentityType::agent("bot")).await,
            Err(StorageError::Validation(_))
        ));
        assert!(manager.add_identity(&tier_ctx, IdentityType::role("admin")).await.is_ok());
    }

    #[tokio::test]
    async fn update_replaces_attributes_and_keeps_created_date() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;
        let alice = manager
            .add_identity(
                &ctx,
                IdentityType::user("alice").with_attribute("dept", "eng"),
            )
            .await
            .unwrap();

        let mut changed = alice.clone().with_attribute("level", 3);
        changed.attributes.remove("dept");
        changed.created_date = chrono::Utc::now() + chrono::Duration::days(1);
        let updated = manager.update_identity(&ctx, changed).await.unwrap();

        assert!(updated.attributes.get("dept").is_none());
        assert_eq!(updated.attributes.get("level"), Some(&AttributeValue::from(3)));
        assert_eq!(updated.created_date, alice.created_date);
    }

    #[tokio::test]
    async fn update_of_unknown_identity_fails() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;
        let mut ghost = IdentityType::role("ghost");
        ghost.id = Some(Uuid::now_v7());

        assert!(manager.update_identity(&ctx, ghost).await.unwrap_err().is_not_found());
        assert!(matches!(
            manager.update_identity(&ctx, IdentityType::role("unsaved")).await,
            Err(StorageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn removing_a_group_detaches_children() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;
        let parent = manager.add_identity(&ctx, IdentityType::group("parent")).await.unwrap();
        let child = manager
            .add_identity(&ctx, IdentityType::new(Group::new("child").with_parent(&parent)))
            .await
            .unwrap();
        let grandchild = manager
            .add_identity(&ctx, IdentityType::new(Group::new("leaf").with_parent(&child)))
            .await
            .unwrap();
        assert_eq!(grandchild.as_group().unwrap().path, "/parent/child/leaf");

        manager.remove_identity(&ctx, &parent).await.unwrap();

        let child = manager.get_group(&ctx, "child").await.unwrap().unwrap();
        assert_eq!(child.as_group().unwrap().parent_id, None);
        assert_eq!(child.as_group().unwrap().path, "/child");
        assert!(manager.get_group(&ctx, "/child/leaf").await.unwrap().is_some());
        assert!(manager.get_group_in(&ctx, "leaf", &child).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removing_an_agent_drops_its_relationships() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;
        let alice = manager
            .add_identity(&ctx, IdentityType::new(User::new("alice")))
            .await
            .unwrap();
        let admin = manager.add_identity(&ctx, IdentityType::role("admin")).await.unwrap();
        manager
            .add_relationship(&ctx, Relationship::grant(&alice, &admin))
            .await
            .unwrap();

        manager.remove_identity(&ctx, &alice).await.unwrap();

        let query = idm_storage::RelationshipQuery::all();
        assert!(manager.fetch_relationships(&ctx, &query).await.unwrap().is_empty());
        assert!(manager.get_user(&ctx, "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn group_cannot_move_below_itself() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;
        let parent = manager.add_identity(&ctx, IdentityType::group("parent")).await.unwrap();
        let child = manager
            .add_identity(&ctx, IdentityType::new(Group::new("child").with_parent(&parent)))
            .await
            .unwrap();

        let mut moved = parent.clone();
        moved.as_group_mut().unwrap().parent_id = child.id;
        assert!(matches!(
            manager.update_identity(&ctx, moved).await,
            Err(StorageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn attribute_helpers_persist() {
        let dir = TempDir::new().unwrap();
        let (manager, ctx, _) = setup(&dir).await;
        let bot = manager.add_identity(&ctx, IdentityType::agent("bot")).await.unwrap();
        let id = bot.id.unwrap();

        manager
            .set_attribute(&ctx, &bot, "scopes", AttributeValue::multi(["read", "write"]))
            .await
            .unwrap();
        assert_eq!(
            manager.get_attribute(id, "scopes").await.unwrap(),
            Some(AttributeValue::multi(["read", "write"]))
        );

        manager.remove_attribute(&ctx, &bot, "scopes").await.unwrap();
        assert!(manager.get_attribute(id, "scopes").await.unwrap().is_none());
    }
}
