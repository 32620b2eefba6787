//! Products: an ephemeral catalog, optionally seeded with demo rows.

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
    Schema::new("Product", vec![
        Field::integer("id").read_only().describe("Unique identifier"),
        Field::string("name").required().min_length(1).max_length(200).describe("Product name"),
        Field::string("description").nullable().describe("Free-form description"),
        Field::number("price").required().min(0.0).describe("Unit price"),
        Field::string("category").default("").max_length(100).describe("Catalog category"),
        Field::boolean("in_stock").default(true).describe("Whether the product can be ordered"),
        Field::timestamp("created_at").describe("When the product was created"),
        Field::timestamp("updated_at").describe("When the product last changed"),
    ])
    .unwrap_or_else(|e| panic!("invalid Product schema: {e}"))
});

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: String,
    pub in_stock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default = "in_stock_default")]
    pub in_stock: bool,
}

fn in_stock_default() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "crate::validate::present")]
    pub description: Option<Option<String>>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub in_stock: Option<bool>,
}

#[derive(Debug, Default)]
pub struct ProductFilter {
    /// Case-insensitive exact match.
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// The rows a fresh process starts with unless demo data is disabled.
pub fn demo_catalog() -> Vec<ProductInput> {
    let item = |name: &str, description: &str, price: f64, category: &str| ProductInput {
        name: name.to_owned(),
        description: Some(description.to_owned()),
        price,
        category: category.to_owned(),
        in_stock: true,
    };
    vec![
        item("Laptop", "High-performance laptop", 999.99, "Electronics"),
        item("Coffee Mug", "Ceramic coffee mug", 12.99, "Home"),
        item("Book", "Programming guide", 24.99, "Education"),
    ]
}

impl Entity for Product {
    type Input = ProductInput;
    type Patch = ProductPatch;
    type Filter = ProductFilter;

    const KIND: &'static str = "Product";

    fn schema() -> &'static Schema {
        &SCHEMA
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, input: ProductInput, now: DateTime<Utc>) -> Self {
        Product {
            id,
            name: input.name,
            description: input.description,
            price: input.price,
            category: input.category,
            in_stock: input.in_stock,
            created_at: now,
            updated_at: now,
        }
    }

    fn replace(&mut self, input: ProductInput, now: DateTime<Utc>) {
        let next = Product {
            name: input.name,
            description: input.description,
            price: input.price,
            category: input.category,
            in_stock: input.in_stock,
            ..self.clone()
        };
        if next != *self {
            *self = Product { updated_at: now, ..next };
        }
    }

    fn merge(&mut self, patch: ProductPatch, now: DateTime<Utc>) {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(price) = patch.price {
            next.price = price;
        }
        if let Some(category) = patch.category {
            next.category = category;
        }
        if let Some(in_stock) = patch.in_stock {
            next.in_stock = in_stock;
        }
        if next != *self {
            *self = Product { updated_at: now, ..next };
        }
    }

    fn matches(&self, filter: &ProductFilter) -> bool {
        filter.category.as_ref().is_none_or(|c| c.eq_ignore_ascii_case(&self.category))
            && filter.min_price.is_none_or(|min| self.price >= min)
            && filter.max_price.is_none_or(|max| self.price <= max)
    }
}

impl Resource for Product {
    const PATH: &'static str = "/products";
    const TAG: &'static str = "products";
    const DELETABLE: bool = true;

    fn store(state: &AppState) -> Arc<dyn Store<Self>> {
        Arc::clone(&state.products)
    }

    fn filter(query: &Query, errors: &mut FieldErrors) -> ProductFilter {
        ProductFilter {
            category: query.get("category").map(str::to_owned),
            min_price: errors.take(query.float("min_price")),
            max_price: errors.take(query.float("max_price")),
        }
    }

    fn filter_params() -> Vec<Param> {
        vec![
            Param::query("category", ParamKind::String, "Case-insensitive category match"),
            Param::query("min_price", ParamKind::Number, "Lowest price, inclusive"),
            Param::query("max_price", ParamKind::Number, "Highest price, inclusive"),
        ]
    }
}
