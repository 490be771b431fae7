use diesel::{
    Connection as _Connection,
    prelude::*,
    result::{DatabaseErrorKind, Error as DbError},
};
use failure::Fail;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{
    ApiError,
    audit,
    db::{
        Connection,
        models as db,
        schema::chapters,
    },
    history::{self, Tracked as _},
};

/// Deepest level of the hierarchy: chapter / section / subsection / clause.
pub const MAX_DEPTH: i16 = 3;

/// Position of a chapter in the numbered hierarchy.
///
/// A depth-*n* node has coordinates for levels 0..=*n* populated and none
/// beyond. Derived ordering sorts a parent directly before its children, and
/// siblings numerically.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Coordinates {
    pub chapter: i32,
    pub section: Option<i32>,
    pub subsection: Option<i32>,
    pub clause: Option<i32>,
}

impl Coordinates {
    pub fn from_db(data: &db::Chapter) -> Coordinates {
        Coordinates {
            chapter: data.chapter,
            section: data.section,
            subsection: data.subsection,
            clause: data.clause,
        }
    }

    /// Nesting level these coordinates describe.
    pub fn depth(&self) -> i16 {
        match (self.section, self.subsection, self.clause) {
            (Some(_), Some(_), Some(_)) => 3,
            (Some(_), Some(_), None) => 2,
            (Some(_), None, None) => 1,
            _ => 0,
        }
    }

    /// Are all populated levels contiguous, starting at the top?
    pub fn is_well_formed(&self) -> bool {
        match (self.section, self.subsection, self.clause) {
            (None, None, None)
            | (Some(_), None, None)
            | (Some(_), Some(_), None)
            | (Some(_), Some(_), Some(_)) => true,
            _ => false,
        }
    }

    /// Coordinates of a child at `number`, or `None` when already at the
    /// deepest level.
    pub fn child(&self, number: i32) -> Option<Coordinates> {
        let mut child = *self;
        match (self.section, self.subsection, self.clause) {
            (None, None, None) => child.section = Some(number),
            (Some(_), None, None) => child.subsection = Some(number),
            (Some(_), Some(_), None) => child.clause = Some(number),
            _ => return None,
        }
        Some(child)
    }

    /// Coordinate value at the deepest populated level.
    fn leaf(&self) -> i32 {
        self.clause
            .or(self.subsection)
            .or(self.section)
            .unwrap_or(self.chapter)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.chapter)?;
        for level in &[self.section, self.subsection, self.clause] {
            if let Some(number) = level {
                write!(fmt, ".{}", number)?;
            }
        }
        Ok(())
    }
}

/// A node in a manual's numbered hierarchy.
#[derive(Debug)]
pub struct Chapter {
    data: db::Chapter,
}

/// A subset of chapter's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: i32,
    pub number: String,
    pub depth: i16,
    pub title: String,
    pub content: String,
    pub parent: Option<i32>,
    pub index: i32,
}

impl Chapter {
    /// Construct `Chapter` from its database counterpart.
    pub(crate) fn from_db(data: db::Chapter) -> Chapter {
        Chapter { data }
    }

    /// Find a chapter of a manual by ID.
    pub fn by_id(db: &Connection, manual: Uuid, id: i32)
    -> Result<Chapter, FindChapterError> {
        chapters::table
            .filter(chapters::manual.eq(manual).and(chapters::id.eq(id)))
            .get_result::<db::Chapter>(db)
            .optional()?
            .ok_or(FindChapterError::NotFound)
            .map(Chapter::from_db)
    }

    /// Get all chapters of a manual, ordered by coordinates, then by display
    /// order.
    pub fn all_of(db: &Connection, manual: Uuid)
    -> Result<Vec<Chapter>, DbError> {
        let mut chapters = chapters::table
            .filter(chapters::manual.eq(manual))
            .get_results::<db::Chapter>(db)?;

        chapters.sort_by_key(|data| (Coordinates::from_db(data), data.index));

        Ok(chapters.into_iter().map(Chapter::from_db).collect())
    }

    /// Create the mandatory chapter 0 of a new manual.
    ///
    /// Takes place within the transaction creating the manual itself.
    pub(crate) fn create_root(db: &Connection, manual: &db::Manual)
    -> Result<Chapter, DbError> {
        let data = diesel::insert_into(chapters::table)
            .values(&db::NewChapter {
                manual: manual.id,
                id: 0,
                chapter: 0,
                section: None,
                subsection: None,
                clause: None,
                depth: 0,
                title: &manual.title,
                content: "",
                parent: None,
                index: 0,
            })
            .get_result::<db::Chapter>(db)?;

        Ok(Chapter::from_db(data))
    }

    /// Create a new chapter under `parent`, or at the top level when `parent`
    /// is `None`.
    ///
    /// The new node is numbered after its last sibling and placed at the end
    /// of the display order.
    pub fn create<A>(
        db: &Connection,
        actor: A,
        manual: Uuid,
        parent: Option<i32>,
        title: &str,
        content: &str,
    ) -> Result<Chapter, CreateChapterError>
    where
        audit::Actor: From<A>,
    {
        let actor = audit::Actor::from(actor);

        db.transaction(|| {
            let siblings = chapters::table
                .filter(chapters::manual.eq(manual))
                .get_results::<db::Chapter>(db)?;

            let next_id = siblings.iter().map(|c| c.id).max().map_or(0, |id| id + 1);

            let coords = match parent {
                None => {
                    let number = siblings.iter()
                        .filter(|c| c.parent.is_none())
                        .map(|c| c.chapter)
                        .max()
                        .map_or(0, |n| n + 1);
                    Coordinates {
                        chapter: number,
                        section: None,
                        subsection: None,
                        clause: None,
                    }
                }
                Some(parent_id) => {
                    let parent = siblings.iter()
                        .find(|c| c.id == parent_id)
                        .ok_or(CreateChapterError::ParentNotFound)?;

                    let number = siblings.iter()
                        .filter(|c| c.parent == Some(parent_id))
                        .map(|c| Coordinates::from_db(c).leaf())
                        .max()
                        .map_or(1, |n| n + 1);

                    Coordinates::from_db(parent)
                        .child(number)
                        .ok_or(CreateChapterError::TooDeep)?
                }
            };

            let index = siblings.iter()
                .filter(|c| c.parent == parent)
                .map(|c| c.index)
                .max()
                .map_or(0, |i| i + 1);

            let data = diesel::insert_into(chapters::table)
                .values(&db::NewChapter {
                    manual,
                    id: next_id,
                    chapter: coords.chapter,
                    section: coords.section,
                    subsection: coords.subsection,
                    clause: coords.clause,
                    depth: coords.depth(),
                    title,
                    content,
                    parent,
                    index,
                })
                .get_result::<db::Chapter>(db)?;

            audit::log_db(
                db, actor, "chapters", data.record_id(), "create", LogNewChapter {
                    number: coords.to_string(),
                    title,
                })?;

            Ok(Chapter::from_db(data))
        })
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::Chapter {
        self.data
    }

    /// Coordinates of this chapter.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::from_db(&self.data)
    }

    /// Get the public portion of this chapter's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            number: self.coordinates().to_string(),
            depth: self.data.depth,
            title: self.data.title.clone(),
            content: self.data.content.clone(),
            parent: self.data.parent,
            index: self.data.index,
        }
    }

    /// Change title of this chapter.
    pub fn set_title<A>(
        &mut self,
        db: &Connection,
        actor: A,
        revision: Option<i32>,
        title: &str,
    ) -> Result<(), DbError>
    where
        audit::Actor: From<A>,
    {
        let actor = audit::Actor::from(actor);

        db.transaction(|| {
            let old = self.data.clone();

            let data = diesel::update(&self.data)
                .set(chapters::title.eq(title))
                .get_result::<db::Chapter>(db)?;

            history::record_update(db, actor, &old, &data, revision)?;
            audit::log_db(
                db, actor, "chapters", data.record_id(), "update", ())?;

            self.data = data;

            Ok(())
        })
    }

    /// Replace content of this chapter.
    pub fn set_content<A>(
        &mut self,
        db: &Connection,
        actor: A,
        revision: Option<i32>,
        content: &str,
    ) -> Result<(), DbError>
    where
        audit::Actor: From<A>,
    {
        let actor = audit::Actor::from(actor);

        db.transaction(|| {
            let old = self.data.clone();

            let data = diesel::update(&self.data)
                .set(chapters::content.eq(content))
                .get_result::<db::Chapter>(db)?;

            history::record_update(db, actor, &old, &data, revision)?;
            audit::log_db(
                db, actor, "chapters", data.record_id(), "update", ())?;

            self.data = data;

            Ok(())
        })
    }

    /// Delete this chapter.
    ///
    /// The mandatory chapter 0 cannot be deleted, nor can a chapter which
    /// still has children.
    pub fn delete<A>(self, db: &Connection, actor: A)
    -> Result<(), DeleteChapterError>
    where
        audit::Actor: From<A>,
    {
        if self.data.depth == 0 && self.data.chapter == 0 {
            return Err(DeleteChapterError::RootChapter);
        }

        let actor = audit::Actor::from(actor);

        db.transaction(|| {
            let children: i64 = chapters::table
                .filter(chapters::manual.eq(self.data.manual)
                    .and(chapters::parent.eq(self.data.id)))
                .count()
                .get_result(db)?;

            if children > 0 {
                return Err(DeleteChapterError::HasChildren);
            }

            diesel::delete(&self.data).execute(db)?;

            // Close the gap left in the display order.
            let siblings = chapters::table.filter(
                chapters::manual.eq(self.data.manual)
                    .and(chapters::parent.is_not_distinct_from(self.data.parent))
                    .and(chapters::index.gt(self.data.index)),
            );
            diesel::update(siblings)
                .set(chapters::index.eq(chapters::index - 1))
                .execute(db)?;

            audit::log_db(
                db, actor, "chapters", self.data.record_id(), "delete", ())?;

            Ok(())
        })
    }
}

impl std::ops::Deref for Chapter {
    type Target = db::Chapter;

    fn deref(&self) -> &db::Chapter {
        &self.data
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindChapterError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No chapter found matching given criteria.
    #[fail(display = "No such chapter")]
    #[api(code = "chapter:not-found", status = "NOT_FOUND")]
    NotFound,
}

impl_from! { for FindChapterError ;
    DbError => |e| FindChapterError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CreateChapterError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Parent chapter doesn't exist in this manual.
    #[fail(display = "No such parent chapter")]
    #[api(code = "chapter:create:no-parent", status = "BAD_REQUEST")]
    ParentNotFound,
    /// Parent is a clause, the deepest level of the hierarchy.
    #[fail(display = "Clauses cannot have children")]
    #[api(code = "chapter:create:too-deep", status = "BAD_REQUEST")]
    TooDeep,
    /// Another chapter already has these coordinates.
    #[fail(display = "A chapter with these coordinates already exists")]
    #[api(code = "chapter:create:duplicate", status = "CONFLICT")]
    Duplicate,
}

impl_from! { for CreateChapterError ;
    DbError => |e| match e {
        DbError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) =>
            CreateChapterError::Duplicate,
        _ => CreateChapterError::Database(e),
    },
}

#[derive(ApiError, Debug, Fail)]
pub enum DeleteChapterError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Deleting chapter 0 is not possible.
    #[fail(display = "Cannot delete chapter 0")]
    #[api(code = "chapter:delete:is-root", status = "BAD_REQUEST")]
    RootChapter,
    /// Chapter still has children.
    #[fail(display = "Cannot delete a chapter with children")]
    #[api(code = "chapter:delete:has-children", status = "BAD_REQUEST")]
    HasChildren,
}

impl_from! { for DeleteChapterError ;
    DbError => |e| DeleteChapterError::Database(e),
}

#[derive(Serialize)]
struct LogNewChapter<'a> {
    number: String,
    title: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(chapter: i32, rest: &[i32]) -> Coordinates {
        Coordinates {
            chapter,
            section: rest.get(0).copied(),
            subsection: rest.get(1).copied(),
            clause: rest.get(2).copied(),
        }
    }

    #[test]
    fn depth_matches_populated_levels() {
        assert_eq!(coords(0, &[]).depth(), 0);
        assert_eq!(coords(2, &[1]).depth(), 1);
        assert_eq!(coords(2, &[1, 3]).depth(), 2);
        assert_eq!(coords(2, &[1, 3, 4]).depth(), 3);
    }

    #[test]
    fn gaps_in_coordinates_are_rejected() {
        assert!(coords(1, &[2, 3, 4]).is_well_formed());
        assert!(coords(1, &[]).is_well_formed());

        let gap = Coordinates {
            chapter: 1,
            section: None,
            subsection: Some(2),
            clause: None,
        };
        assert!(!gap.is_well_formed());
    }

    #[test]
    fn child_extends_the_deepest_level() {
        let chapter = coords(2, &[]);
        let section = chapter.child(1).unwrap();
        assert_eq!(section, coords(2, &[1]));

        let clause = coords(2, &[1, 3]).child(7).unwrap();
        assert_eq!(clause, coords(2, &[1, 3, 7]));

        assert!(clause.child(1).is_none());
    }

    #[test]
    fn parents_order_before_their_children() {
        let mut all = vec![
            coords(2, &[]),
            coords(1, &[2]),
            coords(1, &[]),
            coords(1, &[2, 1]),
            coords(1, &[1]),
            coords(0, &[]),
        ];
        all.sort();

        assert_eq!(all, [
            coords(0, &[]),
            coords(1, &[]),
            coords(1, &[1]),
            coords(1, &[2]),
            coords(1, &[2, 1]),
            coords(2, &[]),
        ]);
    }

    #[test]
    fn display_joins_levels_with_dots() {
        assert_eq!(coords(0, &[]).to_string(), "0");
        assert_eq!(coords(2, &[1, 3, 4]).to_string(), "2.1.3.4");
    }
}
