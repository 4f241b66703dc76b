#![allow(dead_code)]

use datakeep_core::{
    open_db_in_memory, Entity, EntityKey, Filter, LoadContext, Relation, SqliteUnitOfWork,
    StoreResult,
};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

pub const SCHEMA: &str = "
CREATE TABLE customers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(name) > 0)
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL
        REFERENCES customers(id) DEFERRABLE INITIALLY DEFERRED,
    total INTEGER NOT NULL
);
CREATE TABLE order_lines (
    order_id INTEGER NOT NULL
        REFERENCES orders(id) DEFERRABLE INITIALLY DEFERRED,
    position INTEGER NOT NULL,
    sku TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    PRIMARY KEY (order_id, position)
);
";

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub orders: Option<Vec<Order>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub total: i64,
    pub customer: Option<Customer>,
    pub lines: Option<Vec<OrderLine>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub order_id: i64,
    pub position: i64,
    pub sku: String,
    pub quantity: i64,
}

pub fn customer(id: i64, name: &str) -> Customer {
    Customer {
        id,
        name: name.to_string(),
        orders: None,
    }
}

pub fn order(id: i64, customer_id: i64, total: i64) -> Order {
    Order {
        id,
        customer_id,
        total,
        customer: None,
        lines: None,
    }
}

pub fn line(order_id: i64, position: i64, sku: &str) -> OrderLine {
    OrderLine {
        order_id,
        position,
        sku: sku.to_string(),
        quantity: 1,
    }
}

fn customer_orders_loaded(customer: &Customer) -> bool {
    customer.orders.is_some()
}

fn load_customer_orders(ctx: &LoadContext<'_>, customer: &mut Customer) -> StoreResult<()> {
    customer.orders = Some(ctx.find_where(Filter::eq("customer_id", customer.id))?);
    Ok(())
}

const CUSTOMER_RELATIONS: &[Relation<Customer>] = &[Relation::collection(
    "orders",
    customer_orders_loaded,
    load_customer_orders,
)];

impl Entity for Customer {
    const TABLE: &'static str = "customers";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] = &["name"];

    fn key(&self) -> EntityKey {
        EntityKey::from(self.id)
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            orders: None,
        })
    }

    fn relations() -> &'static [Relation<Self>] {
        CUSTOMER_RELATIONS
    }
}

fn order_customer_loaded(order: &Order) -> bool {
    order.customer.is_some()
}

fn load_order_customer(ctx: &LoadContext<'_>, order: &mut Order) -> StoreResult<()> {
    order.customer = ctx.find(order.customer_id)?;
    Ok(())
}

fn order_lines_loaded(order: &Order) -> bool {
    order.lines.is_some()
}

fn load_order_lines(ctx: &LoadContext<'_>, order: &mut Order) -> StoreResult<()> {
    order.lines = Some(ctx.find_where(Filter::eq("order_id", order.id))?);
    Ok(())
}

impl Order {
    pub const CUSTOMER: Relation<Order> =
        Relation::reference("customer", order_customer_loaded, load_order_customer);
    pub const LINES: Relation<Order> =
        Relation::collection("lines", order_lines_loaded, load_order_lines);
}

const ORDER_RELATIONS: &[Relation<Order>] = &[Order::CUSTOMER, Order::LINES];

impl Entity for Order {
    const TABLE: &'static str = "orders";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] = &["customer_id", "total"];

    fn key(&self) -> EntityKey {
        EntityKey::from(self.id)
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.customer_id), Value::Integer(self.total)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            customer_id: row.get("customer_id")?,
            total: row.get("total")?,
            customer: None,
            lines: None,
        })
    }

    fn relations() -> &'static [Relation<Self>] {
        ORDER_RELATIONS
    }
}

impl Entity for OrderLine {
    const TABLE: &'static str = "order_lines";
    const KEY_COLUMNS: &'static [&'static str] = &["order_id", "position"];
    const COLUMNS: &'static [&'static str] = &["sku", "quantity"];

    fn key(&self) -> EntityKey {
        EntityKey::from((self.order_id, self.position))
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Text(self.sku.clone()), Value::Integer(self.quantity)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            order_id: row.get("order_id")?,
            position: row.get("position")?,
            sku: row.get("sku")?,
            quantity: row.get("quantity")?,
        })
    }
}

pub fn migrated_connection() -> Connection {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
}

pub fn open_uow() -> SqliteUnitOfWork {
    SqliteUnitOfWork::new(migrated_connection())
}
