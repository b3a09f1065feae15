//! Generic add, update and remove over identities and relationships.

use idm_model::AttributedType;
use idm_spi::IdentityContext;
use idm_storage::StorageResult;

use crate::manager::IdentityManager;

impl IdentityManager {
    /// Adds an identity or relationship.
    ///
    /// ## Errors
    ///
    /// See [`IdentityManager::add_identity`] and
    /// [`IdentityManager::add_relationship`].
    pub async fn add(
        &self,
        ctx: &IdentityContext,
        value: impl Into<AttributedType> + Send,
    ) -> StorageResult<AttributedType> {
        Ok(match value.into() {
            AttributedType::Identity(identity) => self.add_identity(ctx, identity).await?.into(),
            AttributedType::Relationship(relationship) => {
                self.add_relationship(ctx, relationship).await?.into()
            }
        })
    }

    /// Updates an identity or relationship.
    ///
    /// ## Errors
    ///
    /// See [`IdentityManager::update_identity`] and
    /// [`IdentityManager::update_relationship`].
    pub async fn update(
        &self,
        ctx: &IdentityContext,
        value: impl Into<AttributedType> + Send,
    ) -> StorageResult<AttributedType> {
        Ok(match value.into() {
            AttributedType::Identity(identity) => {
                self.update_identity(ctx, identity).await?.into()
            }
            AttributedType::Relationship(relationship) => {
                self.update_relationship(ctx, relationship).await?.into()
            }
        })
    }

    /// Removes an identity or relationship.
    ///
    /// ## Errors
    ///
    /// See [`IdentityManager::remove_identity`] and
    /// [`IdentityManager::remove_relationship`].
    pub async fn remove(&self, ctx: &IdentityContext, value: &AttributedType) -> StorageResult<()> {
        match value {
            AttributedType::Identity(identity) => self.remove_identity(ctx, identity).await,
            AttributedType::Relationship(relationship) => {
                self.remove_relationship(ctx, relationship).await
            }
        }
    }
}
