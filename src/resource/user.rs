//! Users: the durable resource, backed by SQLite in production.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::docs::{Param, ParamKind};
use crate::request::Query;
use crate::store::{Entity, Store};
use crate::validate::{Field, Schema};

use super::{FieldErrors, Resource};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new("User", vec![
        Field::integer("id").read_only().describe("Unique identifier"),
        Field::string("name").required().min_length(1).max_length(100).describe("Full name"),
        Field::string("email").required().email().max_length(255).describe("Email address, unique across users"),
        Field::integer("age").nullable().min(0.0).max(150.0).describe("Age in years"),
        Field::string("bio").nullable().max_length(1000).describe("Short biography"),
        Field::timestamp("created_at").describe("When the user was created"),
        Field::timestamp("updated_at").describe("When the user last changed"),
    ])
    .unwrap_or_else(|e| panic!("invalid User schema: {e}"))
});

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub age: Option<i64>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// `None` leaves a field alone; `Some(None)` clears a nullable one.
#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "crate::validate::present")]
    pub age: Option<Option<i64>>,
    #[serde(default, deserialize_with = "crate::validate::present")]
    pub bio: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct UserFilter {
    /// Exact match.
    pub email: Option<String>,
    /// Literal substring, ignoring ASCII case only.
    pub name: Option<String>,
}

impl User {
    fn touch_if_changed(&mut self, next: User, now: DateTime<Utc>) {
        if next != *self {
            *self = User { updated_at: now, ..next };
        }
    }
}

impl Entity for User {
    type Input = UserInput;
    type Patch = UserPatch;
    type Filter = UserFilter;

    const KIND: &'static str = "User";

    fn schema() -> &'static Schema {
        &SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, input: UserInput, now: DateTime<Utc>) -> Self {
        User {
            id,
            name: input.name,
            email: input.email,
            age: input.age,
            bio: input.bio,
            created_at: now,
            updated_at: now,
        }
    }

    fn replace(&mut self, input: UserInput, now: DateTime<Utc>) {
        let next = User {
            name: input.name,
            email: input.email,
            age: input.age,
            bio: input.bio,
            ..self.clone()
        };
        self.touch_if_changed(next, now);
    }

    fn merge(&mut self, patch: UserPatch, now: DateTime<Utc>) {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(email) = patch.email {
            next.email = email;
        }
        if let Some(age) = patch.age {
            next.age = age;
        }
        if let Some(bio) = patch.bio {
            next.bio = bio;
        }
        self.touch_if_changed(next, now);
    }

    fn matches(&self, filter: &UserFilter) -> bool {
        filter.email.as_ref().is_none_or(|email| *email == self.email)
            && filter.name.as_ref().is_none_or(|needle| {
                self.name.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
            })
    }

    fn conflicts_with(&self, other: &Self) -> Option<String> {
        (self.email == other.email).then(|| "Email already registered".to_owned())
    }
}

impl Resource for User {
    const PATH: &'static str = "/users";
    const TAG: &'static str = "users";
    const DELETABLE: bool = false;

    fn store(state: &AppState) -> Arc<dyn Store<Self>> {
        Arc::clone(&state.users)
    }

    fn filter(query: &Query, _errors: &mut FieldErrors) -> UserFilter {
        UserFilter {
            email: query.get("email").map(str::to_owned),
            name: query.get("name").map(str::to_owned),
        }
    }

    fn filter_params() -> Vec<Param> {
        vec![
            Param::query("email", ParamKind::String, "Only the user with this exact email"),
            Param::query("name", ParamKind::String, "Substring of the name, ignoring ASCII case"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::validate::Mode;

    fn ann() -> User {
        let input = UserInput { name: "Ann".into(), email: "ann@example.com".into(), age: Some(30), bio: Some("hi".into()) };
        User::build(1, input, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn replace_moves_updated_at_only_on_change() {
        let mut user = ann();
        let later = DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(60);

        let same = UserInput { name: "Ann".into(), email: "ann@example.com".into(), age: Some(30), bio: Some("hi".into()) };
        user.replace(same, later);
        assert_eq!(user.updated_at, DateTime::<Utc>::UNIX_EPOCH);

        let older = UserInput { name: "Ann".into(), email: "ann@example.com".into(), age: Some(31), bio: None };
        user.replace(older, later);
        assert_eq!(user.age, Some(31));
        assert_eq!(user.bio, None);
        assert_eq!(user.updated_at, later);
        assert_eq!(user.created_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: UserPatch = User::schema().validate(&json!({"bio": null}), Mode::Partial).unwrap();
        assert!(patch.age.is_none());
        assert_eq!(patch.bio, Some(None));

        let mut user = ann();
        user.merge(patch, DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1));
        assert_eq!(user.age, Some(30));
        assert_eq!(user.bio, None);
    }

    #[test]
    fn schema_enforces_field_rules() {
        let err = User::schema()
            .validate::<UserInput>(&json!({"name": "", "email": "nope", "age": 151}), Mode::Full)
            .unwrap_err();
        assert_eq!(err.message_for("name"), Some("must not be empty"));
        assert_eq!(err.message_for("email"), Some("must be a valid email address"));
        assert_eq!(err.message_for("age"), Some("must be less than or equal to 150"));

        let err = User::schema()
            .validate::<UserPatch>(&json!({"name": null}), Mode::Partial)
            .unwrap_err();
        assert_eq!(err.message_for("name"), Some("must not be null"));
    }

    #[test]
    fn filters_match_email_exactly_and_name_loosely() {
        let user = ann();
        assert!(user.matches(&UserFilter { name: Some("AN".into()), ..UserFilter::default() }));
        assert!(!user.matches(&UserFilter { email: Some("ANN@example.com".into()), ..UserFilter::default() }));
        assert!(user.conflicts_with(&ann()).is_some());
    }

    #[test]
    fn name_filter_folds_ascii_case_only() {
        let mut user = ann();
        user.name = "Émile".into();
        let by_name = |needle: &str| UserFilter { name: Some(needle.into()), ..UserFilter::default() };
        assert!(user.matches(&by_name("MILE")));
        assert!(user.matches(&by_name("Ém")));
        assert!(!user.matches(&by_name("ém")));
    }
}
