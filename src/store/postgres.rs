use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Statement,
    TransactionTrait,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, LockType, OnConflict},
};
use uuid::Uuid;

use crate::{
    entity::{
        cart_items::{self, ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{self, Column as ProdCol, Entity as Products},
        users::{self, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    models::{CartLine, Order, OrderLine, Product, ShippingInfo, User},
    store::{Store, StoreTx},
};

/// Postgres-backed store. Row locks are `SELECT ... FOR UPDATE` and every
/// transaction runs with `lock_timeout` set.
#[derive(Clone)]
pub struct PgStore {
    orm: DatabaseConnection,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(orm: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self { orm, lock_timeout }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let txn = self.orm.begin().await?;
        let backend = txn.get_database_backend();
        txn.execute(Statement::from_string(
            backend,
            format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis()),
        ))
        .await?;
        Ok(Box::new(PgTx { txn }))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Users::find()
            .filter(UserCol::Email.eq(email))
            .one(&self.orm)
            .await?
            .map(user_from_entity)
            .transpose()
    }

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(Products::find_by_id(id)
            .one(&self.orm)
            .await?
            .map(product_from_entity))
    }

    async fn list_products(&self, limit: u64, offset: u64) -> AppResult<(Vec<Product>, u64)> {
        let finder = Products::find().order_by_asc(ProdCol::Id);
        let total = finder.clone().count(&self.orm).await?;
        let items = finder
            .limit(limit)
            .offset(offset)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(product_from_entity)
            .collect();
        Ok((items, total))
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>> {
        match Orders::find_by_id(id).one(&self.orm).await? {
            Some(model) => Ok(Some(load_order(&self.orm, model).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<Order>, u64)> {
        let finder = Orders::find()
            .filter(OrderCol::UserId.eq(user_id))
            .order_by_desc(OrderCol::OrderedAt);

        let total = finder.clone().count(&self.orm).await?;
        let models = finder.limit(limit).offset(offset).all(&self.orm).await?;
        if models.is_empty() {
            return Ok((Vec::new(), total));
        }

        let email = owner_email(&self.orm, user_id).await?;
        let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
        let mut lines_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        for item in OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(ids))
            .order_by_asc(OrderItemCol::LineNo)
            .all(&self.orm)
            .await?
        {
            lines_by_order.entry(item.order_id).or_default().push(item);
        }

        let orders = models
            .into_iter()
            .map(|model| {
                let items = lines_by_order.remove(&model.id).unwrap_or_default();
                order_from_entity(model, email.clone(), items)
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok((orders, total))
    }

    async fn cart_lines(&self, user_id: Uuid) -> AppResult<Vec<(CartLine, Product)>> {
        let rows = CartItems::find()
            .filter(CartCol::UserId.eq(user_id))
            .order_by_desc(CartCol::UpdatedAt)
            .find_also_related(Products)
            .all(&self.orm)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(line, product)| {
                product.map(|p| (cart_line_from_entity(line), product_from_entity(p)))
            })
            .collect())
    }

    async fn find_cart_line(&self, id: Uuid) -> AppResult<Option<CartLine>> {
        Ok(CartItems::find_by_id(id)
            .one(&self.orm)
            .await?
            .map(cart_line_from_entity))
    }

    async fn update_cart_line(&self, line: &CartLine) -> AppResult<()> {
        update_cart_quantity(&self.orm, line).await
    }

    async fn delete_cart_lines(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = CartItems::delete_many()
            .filter(CartCol::Id.is_in(ids.iter().copied()))
            .exec(&self.orm)
            .await?;
        Ok(result.rows_affected)
    }

    async fn clear_cart(&self, user_id: Uuid) -> AppResult<u64> {
        let result = CartItems::delete_many()
            .filter(CartCol::UserId.eq(user_id))
            .exec(&self.orm)
            .await?;
        Ok(result.rows_affected)
    }
}

pub struct PgTx {
    txn: DatabaseTransaction,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_products(&mut self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, Product>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = Products::find()
            .filter(ProdCol::Id.is_in(ids.iter().copied()))
            .order_by_asc(ProdCol::Id)
            .lock(LockType::Update)
            .all(&self.txn)
            .await
            .map_err(lock_error)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id, product_from_entity(row)))
            .collect())
    }

    async fn save_stock(&mut self, product: &Product) -> AppResult<()> {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::value(product.stock))
            .filter(ProdCol::Id.eq(product.id))
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn lock_cart_line(
        &mut self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> AppResult<Option<CartLine>> {
        Ok(CartItems::find()
            .filter(CartCol::UserId.eq(user_id))
            .filter(CartCol::ProductId.eq(product_id))
            .lock(LockType::Update)
            .one(&self.txn)
            .await
            .map_err(lock_error)?
            .map(cart_line_from_entity))
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> AppResult<CartLine> {
        let active = CartActive {
            id: Set(line.id),
            user_id: Set(line.user_id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            created_at: Set(line.created_at.into()),
            updated_at: Set(line.updated_at.into()),
        };
        let on_conflict = OnConflict::columns([CartCol::UserId, CartCol::ProductId])
            .value(CartCol::Quantity, Expr::cust("cart_items.quantity + EXCLUDED.quantity"))
            .value(CartCol::UpdatedAt, Expr::cust("EXCLUDED.updated_at"))
            .to_owned();

        let stored = CartItems::insert(active)
            .on_conflict(on_conflict)
            .exec_with_returning(&self.txn)
            .await
            .map_err(lock_error)?;
        Ok(cart_line_from_entity(stored))
    }

    async fn update_cart_line(&mut self, line: &CartLine) -> AppResult<()> {
        update_cart_quantity(&self.txn, line).await
    }

    async fn insert_order(&mut self, order: &Order) -> AppResult<()> {
        let now = DateTimeWithTimeZone::from(Utc::now());
        Orders::insert(OrderActive {
            id: Set(order.id),
            user_id: Set(order.user_id),
            status: Set(order.status.as_str().to_string()),
            total_amount: Set(order.total_amount),
            shipping_address: Set(order.shipping.address.clone()),
            shipping_phone: Set(order.shipping.phone.clone()),
            shipping_name: Set(order.shipping.name.clone()),
            ordered_at: Set(order.ordered_at.into()),
            delivered_at: Set(order.delivered_at.map(Into::into)),
            updated_at: Set(now),
        })
        .exec(&self.txn)
        .await?;

        let items = order.lines.iter().enumerate().map(|(idx, line)| OrderItemActive {
            id: Set(line.id),
            order_id: Set(order.id),
            line_no: Set(idx as i32),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
        });
        OrderItems::insert_many(items).exec(&self.txn).await?;
        Ok(())
    }

    async fn lock_order(&mut self, id: Uuid) -> AppResult<Option<Order>> {
        let model = Orders::find_by_id(id)
            .lock(LockType::Update)
            .one(&self.txn)
            .await
            .map_err(lock_error)?;
        match model {
            Some(model) => Ok(Some(load_order(&self.txn, model).await?)),
            None => Ok(None),
        }
    }

    async fn save_order_status(&mut self, order: &Order) -> AppResult<()> {
        Orders::update_many()
            .col_expr(OrderCol::Status, Expr::value(order.status.as_str()))
            .col_expr(
                OrderCol::DeliveredAt,
                Expr::value(order.delivered_at.map(DateTimeWithTimeZone::from)),
            )
            .col_expr(
                OrderCol::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(OrderCol::Id.eq(order.id))
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.txn.commit().await?;
        Ok(())
    }
}

/// Lock waits that hit `lock_timeout` (55P03) or lose a deadlock check
/// (40P01) become [`AppError::LockTimeout`].
fn lock_error(err: DbErr) -> AppError {
    let code = match &err {
        DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db)))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db))) => {
            db.code().map(|c| c.into_owned())
        }
        _ => None,
    };
    match code.as_deref() {
        Some("55P03") | Some("40P01") => AppError::LockTimeout,
        _ => AppError::OrmError(err),
    }
}

async fn update_cart_quantity<C: ConnectionTrait>(conn: &C, line: &CartLine) -> AppResult<()> {
    let result = CartItems::update_many()
        .col_expr(CartCol::Quantity, Expr::value(line.quantity))
        .col_expr(
            CartCol::UpdatedAt,
            Expr::value(DateTimeWithTimeZone::from(line.updated_at)),
        )
        .filter(CartCol::Id.eq(line.id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::CartLineNotFound(line.id));
    }
    Ok(())
}

async fn owner_email<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<String> {
    let user = Users::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order owner {user_id} is missing")))?;
    Ok(user.email)
}

async fn load_order<C: ConnectionTrait>(conn: &C, model: OrderModel) -> AppResult<Order> {
    let email = owner_email(conn, model.user_id).await?;
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(model.id))
        .order_by_asc(OrderItemCol::LineNo)
        .all(conn)
        .await?;
    order_from_entity(model, email, items)
}

fn order_from_entity(model: OrderModel, user_email: String, items: Vec<OrderItemModel>) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        user_email,
        status: model.status.parse()?,
        total_amount: model.total_amount,
        shipping: ShippingInfo {
            address: model.shipping_address,
            phone: model.shipping_phone,
            name: model.shipping_name,
        },
        ordered_at: model.ordered_at.with_timezone(&Utc),
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        lines: items
            .into_iter()
            .map(order_line_from_entity)
            .collect::<AppResult<Vec<_>>>()?,
    })
}

fn order_line_from_entity(model: OrderItemModel) -> AppResult<OrderLine> {
    Ok(OrderLine {
        id: model.id,
        product_id: model.product_id,
        product_name: model.product_name,
        quantity: model.quantity,
        unit_price: model.price,
        line_total: OrderLine::checked_total(model.price, model.quantity)?,
    })
}

fn product_from_entity(model: products::Model) -> Product {
    Product {
        id: model.id,
        name: model.name,
        price: model.price,
        stock: model.stock,
        external_id: model.external_id,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn cart_line_from_entity(model: cart_items::Model) -> CartLine {
    CartLine {
        id: model.id,
        user_id: model.user_id,
        product_id: model.product_id,
        quantity: model.quantity,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn user_from_entity(model: users::Model) -> AppResult<User> {
    Ok(User {
        id: model.id,
        email: model.email,
        role: model.role.parse()?,
        created_at: model.created_at.with_timezone(&Utc),
    })
}
