//! Relation traversal - parent handles, child and sibling fetches, linking
//!
//! Parent traversal is cheap: it builds an id-only handle from the held
//! foreign key. Child and sibling traversal run one query each and hydrate
//! every returned row directly, so the results never lazy-load.

use crate::entity::{Assign, Entity, invalid};
use crate::query::{self, Statement};
use crate::schema::{AttributeRef, EntityDescriptor, FieldKey};
use crate::storage::Session;
use crate::value::Value;
use crate::{Error, Result, RowId};

impl Entity {
    /// Unloaded handle to the referenced parent, `None` when the key is NULL
    pub fn parent(&mut self, session: &Session, name: &str) -> Result<Option<Entity>> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Parent(i)) => self.parent_at(session, descriptor, i),
            _ => Err(descriptor.unrecognized(name)),
        }
    }

    pub(crate) fn parent_at(
        &mut self,
        session: &Session,
        descriptor: &EntityDescriptor,
        index: usize,
    ) -> Result<Option<Entity>> {
        let key = FieldKey::Parent(index);
        if self.field(key).is_none() {
            self.ensure_loaded(session, descriptor)?;
        }

        let parent = &descriptor.parents[index];
        match self.field(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(id)) => Ok(Some(Entity::with_id(parent.target, *id))),
            Some(other) => Err(Error::InvalidRow {
                entity: descriptor.name.clone(),
                reason: format!("'{}' holds a non-integer key {}", parent.storage, other),
            }),
        }
    }

    /// Point a parent relation at a raw id or at a persisted entity
    pub fn set_parent<'a>(
        &mut self,
        session: &Session,
        name: &str,
        value: impl Into<Assign<'a>>,
    ) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Parent(i)) => self.assign_parent(descriptor, i, value.into()),
            _ => Err(descriptor.unrecognized(name)),
        }
    }

    pub(crate) fn assign_parent(
        &mut self,
        descriptor: &EntityDescriptor,
        index: usize,
        value: Assign<'_>,
    ) -> Result<()> {
        let parent = &descriptor.parents[index];
        let key = match value {
            Assign::Value(raw) => raw,
            Assign::Entity(entity) => {
                if entity.entity_type() != parent.target {
                    return Err(invalid(descriptor, &parent.name, "entity has the wrong type"));
                }
                let id = entity.id().ok_or_else(|| {
                    invalid(descriptor, &parent.name, "parent entity has not been saved")
                })?;
                Value::Integer(id)
            }
        };
        self.write_field(FieldKey::Parent(index), key);
        Ok(())
    }

    /// Rows of the child type whose foreign key references this entity
    pub fn children(&self, session: &Session, name: &str) -> Result<Vec<Entity>> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Child(i)) => self.children_at(session, descriptor, i),
            _ => Err(descriptor.unrecognized(name)),
        }
    }

    pub(crate) fn children_at(
        &self,
        session: &Session,
        descriptor: &EntityDescriptor,
        index: usize,
    ) -> Result<Vec<Entity>> {
        let id = self.require_id(descriptor)?;
        let child = &descriptor.children[index];
        let child_descriptor = session.schema().descriptor(child.target)?;

        let records = session.execute(
            &Statement::new(query::select_children(&child_descriptor.table, &descriptor.table))
                .bind(id),
        )?;
        Entity::hydrate_all(child.target, child_descriptor, &records)
    }

    /// Entities linked to this one through the relation's junction table
    pub fn siblings(&self, session: &Session, name: &str) -> Result<Vec<Entity>> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Sibling(i)) => self.siblings_at(session, descriptor, i),
            _ => Err(descriptor.unrecognized(name)),
        }
    }

    pub(crate) fn siblings_at(
        &self,
        session: &Session,
        descriptor: &EntityDescriptor,
        index: usize,
    ) -> Result<Vec<Entity>> {
        let id = self.require_id(descriptor)?;
        let sibling = &descriptor.siblings[index];
        let sibling_descriptor = session.schema().descriptor(sibling.target)?;

        let records = session.execute(
            &Statement::new(query::select_siblings(
                &sibling_descriptor.table,
                &sibling.junction.table,
                &descriptor.table,
            ))
            .bind(id),
        )?;
        Entity::hydrate_all(sibling.target, sibling_descriptor, &records)
    }

    /// Insert the junction row linking this entity and `other` right away
    pub fn link_sibling(&self, session: &Session, name: &str, other: &Entity) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        match descriptor.resolve(name) {
            Some(AttributeRef::Sibling(i)) => self.link_at(session, descriptor, i, other),
            _ => Err(descriptor.unrecognized(name)),
        }
    }

    pub(crate) fn link_at(
        &self,
        session: &Session,
        descriptor: &EntityDescriptor,
        index: usize,
        other: &Entity,
    ) -> Result<()> {
        let sibling = &descriptor.siblings[index];
        if other.entity_type() != sibling.target {
            return Err(invalid(descriptor, &sibling.name, "entity has the wrong type"));
        }
        let id = self.require_id(descriptor)?;
        let other_descriptor = session.schema().descriptor(sibling.target)?;
        let other_id = other.require_id(other_descriptor)?;

        let junction = &sibling.junction;
        let own_column = junction.column_for(&descriptor.table);
        let values = junction.columns.iter().map(|column| {
            if column == own_column {
                Value::Integer(id)
            } else {
                Value::Integer(other_id)
            }
        });

        session.execute(
            &Statement::new(query::insert_junction(
                &junction.table,
                [junction.columns[0].as_str(), junction.columns[1].as_str()],
            ))
            .bind_all(values),
        )?;
        tracing::debug!(
            "Linked {} {} with {} {} via {}",
            descriptor.name,
            id,
            other_descriptor.name,
            other_id,
            junction.table
        );
        Ok(())
    }

    /// Point a batch of child rows at this entity in one statement
    pub fn reassign_children(
        &self,
        session: &Session,
        name: &str,
        child_ids: &[RowId],
    ) -> Result<()> {
        let descriptor = self.descriptor(session)?;
        let Some(AttributeRef::Child(index)) = descriptor.resolve(name) else {
            return Err(descriptor.unrecognized(name));
        };
        let id = self.require_id(descriptor)?;
        if child_ids.is_empty() {
            return Ok(());
        }

        let child_descriptor = session.schema().descriptor(descriptor.children[index].target)?;
        session.execute(
            &Statement::new(query::reassign_children(
                &child_descriptor.table,
                &descriptor.table,
                child_ids.len(),
            ))
            .bind(id)
            .bind_all(child_ids.iter().copied().map(Value::Integer)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_parent_assignment_by_entity() {
        let session = fixtures::blog_session();
        session
            .execute_batch(r#"INSERT INTO "category" ("category_id", "category_title") VALUES (30, 'old')"#)
            .unwrap();

        let section = session.find("Section", 5).unwrap();
        let mut category = session.find("Category", 30).unwrap();
        category.set(&session, "section", &section).unwrap();
        category.save(&session).unwrap();

        let mut reloaded = session.find("Category", 30).unwrap();
        let parent = reloaded.parent(&session, "section").unwrap().unwrap();
        assert_eq!(parent.id(), Some(5));
        assert!(!parent.is_loaded());
        assert_eq!(
            reloaded.snapshot(&session).unwrap()[2],
            ("section_id".to_string(), Value::Integer(5))
        );
    }

    #[test]
    fn test_parent_handle_issues_no_query() {
        let session = fixtures::blog_session();
        let mut comment = session.create("Comment").unwrap();
        comment.set_parent(&session, "user", 7).unwrap();

        let before = session.statements_executed();
        let user = comment.parent(&session, "user").unwrap().unwrap();
        assert_eq!(user.id(), Some(7));
        assert_eq!(user.entity_type(), session.entity_type("User").unwrap());
        assert_eq!(session.statements_executed(), before);
    }

    #[test]
    fn test_parent_handle_loads_on_first_column_read() {
        let session = fixtures::blog_session();
        let mut section = session.create("Section").unwrap();
        section.set(&session, "title", "News").unwrap();
        section.save(&session).unwrap();
        let mut category = session.create("Category").unwrap();
        category.set(&session, "section", &section).unwrap();
        category.save(&session).unwrap();

        let mut parent = category.parent(&session, "section").unwrap().unwrap();
        let before = session.statements_executed();
        assert_eq!(parent.column(&session, "title").unwrap(), &Value::from("News"));
        assert_eq!(session.statements_executed(), before + 1);
        assert!(parent.is_loaded());

        parent.column(&session, "title").unwrap();
        assert_eq!(session.statements_executed(), before + 1);
    }

    #[test]
    fn test_null_parent_is_none() {
        let session = fixtures::blog_session();
        let mut category = session.create("Category").unwrap();
        category.set(&session, "title", "orphan").unwrap();
        category.save(&session).unwrap();

        let mut reloaded = session.find("Category", category.id().unwrap()).unwrap();
        assert!(reloaded.parent(&session, "section").unwrap().is_none());
    }

    #[test]
    fn test_unsaved_parent_entity_rejected() {
        let session = fixtures::blog_session();
        let section = session.create("Section").unwrap();
        let mut category = session.create("Category").unwrap();
        assert!(matches!(
            category.set(&session, "section", &section).unwrap_err(),
            Error::InvalidAssignment { .. }
        ));
        let user = session.find("User", 1).unwrap();
        assert!(matches!(
            category.set(&session, "section", &user).unwrap_err(),
            Error::InvalidAssignment { .. }
        ));
    }

    #[test]
    fn test_children_are_hydrated() {
        let session = fixtures::blog_session();
        let mut section = session.create("Section").unwrap();
        section.set(&session, "title", "News").unwrap();
        section.save(&session).unwrap();

        for title in ["world", "local"] {
            let mut category = session.create("Category").unwrap();
            category.set(&session, "title", title).unwrap();
            category.set(&session, "section", &section).unwrap();
            category.save(&session).unwrap();
        }
        let before = session.statements_executed();

        let mut categories = section.get(&session, "categories").unwrap().into_entities().unwrap();
        assert_eq!(categories.len(), 2);
        let mut titles = Vec::new();
        for category in &mut categories {
            assert!(category.is_loaded());
            assert!(category.id().is_some());
            titles.push(category.column(&session, "title").unwrap().to_string());
        }
        titles.sort();
        assert_eq!(titles, vec!["local", "world"]);
        assert_eq!(session.statements_executed(), before + 1);
    }

    #[test]
    fn test_children_of_unsaved_entity() {
        let session = fixtures::blog_session();
        let section = session.create("Section").unwrap();
        assert!(matches!(
            section.children(&session, "categories").unwrap_err(),
            Error::NotPersisted { .. }
        ));
    }

    #[test]
    fn test_child_relation_is_read_only() {
        let session = fixtures::blog_session();
        let mut section = session.find("Section", 1).unwrap();
        assert!(matches!(
            section.set(&session, "categories", 3).unwrap_err(),
            Error::InvalidAssignment { .. }
        ));
    }

    #[test]
    fn test_sibling_link_and_fetch() {
        let session = fixtures::blog_session();
        let mut post = session.create("Post").unwrap();
        post.set(&session, "title", "ololo").unwrap();
        post.save(&session).unwrap();

        let mut tag = session.create("Tag").unwrap();
        tag.set(&session, "name", "tag123").unwrap();
        tag.save(&session).unwrap();

        post.set(&session, "tags", &tag).unwrap();

        let before = session.statements_executed();
        let mut tags = post.siblings(&session, "tags").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id(), tag.id());
        assert_eq!(tags[0].column(&session, "name").unwrap(), &Value::from("tag123"));
        assert_eq!(session.statements_executed(), before + 1);
    }

    #[test]
    fn test_sibling_symmetry() {
        let session = fixtures::blog_session();
        let mut post = session.create("Post").unwrap();
        post.set(&session, "title", "hello").unwrap();
        post.save(&session).unwrap();
        let mut tag = session.create("Tag").unwrap();
        tag.set(&session, "name", "rust").unwrap();
        tag.save(&session).unwrap();

        // link from the tag side, discover from both
        tag.link_sibling(&session, "posts", &post).unwrap();

        let mut posts = tag.siblings(&session, "posts").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].column(&session, "title").unwrap(), &Value::from("hello"));

        let tags = post.siblings(&session, "tags").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id(), tag.id());
    }

    #[test]
    fn test_hydrated_sibling_can_be_saved() {
        let session = fixtures::blog_session();
        let mut post = session.create("Post").unwrap();
        post.save(&session).unwrap();
        let mut tag = session.create("Tag").unwrap();
        tag.set(&session, "name", "draft").unwrap();
        tag.save(&session).unwrap();
        post.link_sibling(&session, "tags", &tag).unwrap();

        let mut fetched = post.siblings(&session, "tags").unwrap().remove(0);
        fetched.set(&session, "name", "final").unwrap();
        fetched.save(&session).unwrap();

        let mut reloaded = session.load("Tag", tag.id().unwrap()).unwrap();
        assert_eq!(reloaded.column(&session, "name").unwrap(), &Value::from("final"));
    }

    #[test]
    fn test_duplicate_link_is_constraint_error() {
        let session = fixtures::blog_session();
        let mut post = session.create("Post").unwrap();
        post.save(&session).unwrap();
        let mut tag = session.create("Tag").unwrap();
        tag.save(&session).unwrap();

        post.link_sibling(&session, "tags", &tag).unwrap();
        let err = post.link_sibling(&session, "tags", &tag).unwrap_err();
        assert_eq!(err.database_kind(), Some(crate::DatabaseErrorKind::Constraint));
    }

    #[test]
    fn test_link_requires_saved_entities() {
        let session = fixtures::blog_session();
        let mut post = session.create("Post").unwrap();
        post.save(&session).unwrap();
        let tag = session.create("Tag").unwrap();

        assert!(matches!(
            post.link_sibling(&session, "tags", &tag).unwrap_err(),
            Error::NotPersisted { .. }
        ));
        assert!(matches!(
            post.set(&session, "tags", "rust").unwrap_err(),
            Error::InvalidAssignment { .. }
        ));
    }

    #[test]
    fn test_reassign_children() {
        let session = fixtures::blog_session();
        let mut first = session.create("Post").unwrap();
        first.save(&session).unwrap();
        let mut second = session.create("Post").unwrap();
        second.save(&session).unwrap();

        let mut ids = Vec::new();
        for text in ["a", "b", "c"] {
            let mut comment = session.create("Comment").unwrap();
            comment.set(&session, "text", text).unwrap();
            comment.set(&session, "post", &first).unwrap();
            comment.save(&session).unwrap();
            ids.push(comment.id().unwrap());
        }

        second.reassign_children(&session, "comments", &ids[..2]).unwrap();
        assert_eq!(first.children(&session, "comments").unwrap().len(), 1);
        assert_eq!(second.children(&session, "comments").unwrap().len(), 2);

        let before = session.statements_executed();
        second.reassign_children(&session, "comments", &[]).unwrap();
        assert_eq!(session.statements_executed(), before);
    }
}
