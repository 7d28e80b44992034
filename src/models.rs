use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(format!("unknown role {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Unit price in minor currency units.
    pub price: i64,
    pub stock: i32,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Takes `quantity` units out of stock. Stock is left untouched on failure.
    pub fn decrease_stock(&mut self, quantity: i32) -> AppResult<()> {
        if quantity <= 0 {
            return Err(AppError::InvalidQuantity(quantity));
        }
        if quantity > self.stock {
            return Err(AppError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= quantity;
        Ok(())
    }

    /// Puts units back. Used for compensation; an overflowing stock is
    /// rejected rather than capped.
    pub fn increase_stock(&mut self, quantity: i32) -> AppResult<()> {
        ensure_positive(quantity)?;
        self.stock = self
            .stock
            .checked_add(quantity)
            .ok_or_else(|| AppError::Validation(format!("stock of product {} is too large", self.id)))?;
        Ok(())
    }

    pub fn has_stock_for(&self, quantity: i32) -> bool {
        self.stock >= quantity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(user_id: Uuid, product_id: Uuid, quantity: i32, now: DateTime<Utc>) -> AppResult<Self> {
        ensure_positive(quantity)?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn increase(&mut self, amount: i32, now: DateTime<Utc>) -> AppResult<()> {
        ensure_positive(amount)?;
        self.quantity = self
            .quantity
            .checked_add(amount)
            .ok_or_else(|| AppError::Validation("cart quantity is too large".into()))?;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_quantity(&mut self, quantity: i32, now: DateTime<Utc>) -> AppResult<()> {
        ensure_positive(quantity)?;
        self.quantity = quantity;
        self.updated_at = now;
        Ok(())
    }
}

pub(crate) fn ensure_positive(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::InvalidQuantity(quantity));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "PREPARING" => Ok(OrderStatus::Preparing),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(AppError::Validation(format!("unknown order status {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingInfo {
    pub address: String,
    pub phone: String,
    pub name: String,
}

impl ShippingInfo {
    pub fn validate(&self) -> AppResult<()> {
        let fields = [
            ("shipping address", &self.address),
            ("shipping phone", &self.phone),
            ("shipping name", &self.name),
        ];
        for (label, value) in fields {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{label} is required")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    /// Price captured when the order was placed.
    pub unit_price: i64,
    pub line_total: i64,
}

impl OrderLine {
    pub fn snapshot(product: &Product, quantity: i32) -> AppResult<Self> {
        ensure_positive(quantity)?;
        Ok(Self {
            id: Uuid::new_v4(),
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
            line_total: Self::checked_total(product.price, quantity)?,
        })
    }

    pub fn checked_total(unit_price: i64, quantity: i32) -> AppResult<i64> {
        unit_price
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| AppError::Validation("line total is too large".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub shipping: ShippingInfo,
    pub ordered_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Builds a new `PENDING` order whose total is derived from its lines.
    pub fn place(
        user: &User,
        shipping: ShippingInfo,
        lines: Vec<OrderLine>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        shipping.validate()?;
        if lines.is_empty() {
            return Err(AppError::Validation("order must contain at least one item".into()));
        }
        let total_amount = Self::compute_total(&lines)?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            user_email: user.email.clone(),
            status: OrderStatus::Pending,
            total_amount,
            shipping,
            ordered_at: now,
            delivered_at: None,
            lines,
        })
    }

    pub fn compute_total(lines: &[OrderLine]) -> AppResult<i64> {
        lines.iter().try_fold(0i64, |acc, line| {
            let line_total = OrderLine::checked_total(line.unit_price, line.quantity)?;
            acc.checked_add(line_total)
                .ok_or_else(|| AppError::Validation("order total is too large".into()))
        })
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Flips the order to `CANCELLED`. The caller restores stock for
    /// every line in the same transaction.
    pub fn cancel(&mut self) -> AppResult<()> {
        if !self.status.can_be_cancelled() {
            return Err(AppError::InvalidOrderStatus {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Administrative transition. Terminal states are final, nothing goes back
    /// to `PENDING`, and `CANCELLED` follows the cancellation rules.
    pub fn change_status(&mut self, to: OrderStatus, now: DateTime<Utc>) -> AppResult<()> {
        let from = self.status;
        if from.is_terminal() || from == to || to == OrderStatus::Pending {
            return Err(AppError::InvalidOrderStatus { from, to });
        }
        if to == OrderStatus::Cancelled {
            return self.cancel();
        }
        self.status = to;
        if to == OrderStatus::Delivered {
            self.delivered_at = Some(now);
        }
        Ok(())
    }
}

/// A cart line joined with the product's current catalog data.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
    pub stock_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItemView {
    pub fn new(line: &CartLine, product: &Product) -> AppResult<Self> {
        Ok(Self {
            id: line.id,
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity: line.quantity,
            line_total: OrderLine::checked_total(product.price, line.quantity)?,
            stock_available: product.has_stock_for(line.quantity),
            created_at: line.created_at,
            updated_at: line.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartSummary {
    pub lines: Vec<CartItemView>,
    pub total_items: usize,
    pub total_amount: i64,
    pub has_out_of_stock_line: bool,
}

impl CartSummary {
    /// Totals use current catalog prices; nothing is snapshotted until checkout.
    pub fn from_lines(lines: Vec<CartItemView>) -> AppResult<Self> {
        let total_amount = lines.iter().try_fold(0i64, |acc, line| {
            acc.checked_add(line.line_total)
                .ok_or_else(|| AppError::Validation("cart total is too large".into()))
        })?;
        let has_out_of_stock_line = lines.iter().any(|line| !line.stock_available);
        Ok(Self {
            total_items: lines.len(),
            total_amount,
            has_out_of_stock_line,
            lines,
        })
    }
}
