//! Partial-update builder
//!
//! Every PATCH endpoint funnels through [`Patch`]: handlers record the
//! fields the client actually sent, and the builder renders a single
//! parameterized `UPDATE ... SET ... WHERE key = $n RETURNING ...`.
//! Column names are `&'static str` chosen by the repository, never taken from
//! the request.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::ValidationError;

/// A value bound into a patch
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Text(Option<String>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Float(Option<f64>),
    Bool(bool),
    Timestamp(Option<DateTime<Utc>>),
    Uuid(Option<Uuid>),
}

macro_rules! patch_value_from {
    ($ty:ty => $variant:ident) => {
        impl From<$ty> for PatchValue {
            fn from(v: $ty) -> Self {
                Self::$variant(Some(v.into()))
            }
        }

        impl From<Option<$ty>> for PatchValue {
            fn from(v: Option<$ty>) -> Self {
                Self::$variant(v.map(Into::into))
            }
        }
    };
}

patch_value_from!(String => Text);
patch_value_from!(&str => Text);
patch_value_from!(i32 => Int);
patch_value_from!(i64 => BigInt);
patch_value_from!(f64 => Float);
patch_value_from!(DateTime<Utc> => Timestamp);
patch_value_from!(Uuid => Uuid);

impl From<bool> for PatchValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Collected column assignments for one row
#[derive(Debug, Clone)]
pub struct Patch {
    table: &'static str,
    key_column: &'static str,
    touch_updated_at: bool,
    sets: Vec<(&'static str, PatchValue)>,
}

impl Patch {
    /// Start a patch for `table`, keyed by `key_column`. `updated_at` is
    /// bumped unless [`Patch::without_timestamp`] is called.
    pub fn new(table: &'static str, key_column: &'static str) -> Self {
        Self {
            table,
            key_column,
            touch_updated_at: true,
            sets: Vec::new(),
        }
    }

    /// For tables without an `updated_at` column.
    pub fn without_timestamp(mut self) -> Self {
        self.touch_updated_at = false;
        self
    }

    /// Assign a column. A later assignment to the same column replaces the
    /// earlier one.
    pub fn set(&mut self, column: &'static str, value: impl Into<PatchValue>) -> &mut Self {
        let value = value.into();
        match self.sets.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.sets.push((column, value)),
        }
        self
    }

    /// Assign a column only when the client sent a value.
    pub fn set_some<T: Into<PatchValue>>(
        &mut self,
        column: &'static str,
        value: Option<T>,
    ) -> &mut Self {
        if let Some(v) = value {
            self.set(column, v);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&PatchValue> {
        self.sets.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sets.iter().map(|(c, _)| *c)
    }

    /// Render the UPDATE statement.
    ///
    /// # Errors
    ///
    /// `ValidationError::NothingToUpdate` when no column was assigned.
    pub fn into_builder(
        self,
        key: Uuid,
        returning: &str,
    ) -> Result<QueryBuilder<'static, Postgres>, ValidationError> {
        if self.sets.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }

        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(self.table).push(" SET ");

        for (i, (column, value)) in self.sets.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(column).push(" = ");
            match value {
                PatchValue::Text(v) => qb.push_bind(v),
                PatchValue::Int(v) => qb.push_bind(v),
                PatchValue::BigInt(v) => qb.push_bind(v),
                PatchValue::Float(v) => qb.push_bind(v),
                PatchValue::Bool(v) => qb.push_bind(v),
                PatchValue::Timestamp(v) => qb.push_bind(v),
                PatchValue::Uuid(v) => qb.push_bind(v),
            };
        }

        if self.touch_updated_at {
            qb.push(", updated_at = NOW()");
        }

        qb.push(" WHERE ")
            .push(self.key_column)
            .push(" = ")
            .push_bind(key);
        qb.push(" RETURNING ").push(returning.to_owned());

        Ok(qb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_parameterized_update() {
        let mut patch = Patch::new("users", "id");
        patch
            .set("full_name", "Ana Cruz")
            .set_some("phone", Some("0917".to_owned()))
            .set_some::<String>("email", None);

        let qb = patch.into_builder(Uuid::nil(), "id, full_name").unwrap();
        assert_eq!(
            qb.sql(),
            "UPDATE users SET full_name = $1, phone = $2, updated_at = NOW() WHERE id = $3 RETURNING id, full_name"
        );
    }

    #[test]
    fn without_timestamp_skips_updated_at() {
        let mut patch = Patch::new("forum_comments", "id").without_timestamp();
        patch.set("content", "edited");
        let qb = patch.into_builder(Uuid::nil(), "id").unwrap();
        assert_eq!(
            qb.sql(),
            "UPDATE forum_comments SET content = $1 WHERE id = $2 RETURNING id"
        );
    }

    #[test]
    fn empty_patch_is_rejected() {
        let patch = Patch::new("events", "id");
        assert!(patch.is_empty());
        assert!(matches!(
            patch.into_builder(Uuid::nil(), "id"),
            Err(ValidationError::NothingToUpdate)
        ));
    }

    #[test]
    fn repeated_column_keeps_last_value() {
        let mut patch = Patch::new("events", "id");
        patch.set("total_volunteers", 10i32).set("total_volunteers", 12i32);
        assert_eq!(patch.columns().count(), 1);
        assert_eq!(patch.get("total_volunteers"), Some(&PatchValue::Int(Some(12))));
    }

    #[test]
    fn explicit_null_is_kept() {
        let mut patch = Patch::new("scholars", "user_id");
        patch.set("sponsor_id", None::<Uuid>);
        assert_eq!(patch.get("sponsor_id"), Some(&PatchValue::Uuid(None)));
    }
}
