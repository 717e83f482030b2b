use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::models::{
    GatewayKind, Order, OrderItem, OrderStatus, Payment, PaymentStatus, ShippingDetails,
};

use super::{PgStore, corrupt};
use crate::store::{OrderStore, StoreError, StoreResult};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: i64,
    total_amount: Decimal,
    currency: String,
    status: String,
    customer_name: String,
    shipping_name: String,
    shipping_email: String,
    shipping_phone: String,
    shipping_address: String,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: String,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    order_id: String,
    amount: Decimal,
    currency: String,
    status: String,
    gateway: String,
    gateway_reference: Option<String>,
    gateway_payment_id: Option<String>,
    refunded_amount: Option<Decimal>,
    refund_reference: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(r: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            status: PaymentStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("payment status", &r.status))?,
            gateway: GatewayKind::parse(&r.gateway).ok_or_else(|| corrupt("gateway", &r.gateway))?,
            order_id: r.order_id,
            amount: r.amount,
            currency: r.currency,
            gateway_reference: r.gateway_reference,
            gateway_payment_id: r.gateway_payment_id,
            refunded_amount: r.refunded_amount,
            refund_reference: r.refund_reference,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn assemble(row: OrderRow, items: Vec<ItemRow>, payment: Payment) -> StoreResult<Order> {
    Ok(Order {
        status: OrderStatus::from_db(&row.status)
            .ok_or_else(|| corrupt("order status", &row.status))?,
        id: row.id,
        user_id: row.user_id,
        total_amount: row.total_amount,
        currency: row.currency,
        customer_name: row.customer_name,
        shipping: ShippingDetails {
            name: row.shipping_name,
            email: row.shipping_email,
            phone: row.shipping_phone,
            address: row.shipping_address,
        },
        items: items
            .into_iter()
            .map(|i| OrderItem {
                order_id: i.order_id,
                product_id: i.product_id,
                product_name: i.product_name,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect(),
        payment,
        version: row.version,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, total_amount, currency, status, customer_name,
                shipping_name, shipping_email, shipping_phone, shipping_address,
                version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&order.id)
        .bind(order.user_id)
        .bind(order.total_amount)
        .bind(&order.currency)
        .bind(order.status.as_db())
        .bind(&order.customer_name)
        .bind(&order.shipping.name)
        .bind(&order.shipping.email)
        .bind(&order.shipping.phone)
        .bind(&order.shipping.address)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&order.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        let p = &order.payment;
        sqlx::query(
            r#"
            INSERT INTO payments (
                order_id, amount, currency, status, gateway, gateway_reference,
                gateway_payment_id, refunded_amount, refund_reference, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&order.id)
        .bind(p.amount)
        .bind(&p.currency)
        .bind(p.status.as_db())
        .bind(p.gateway.as_str())
        .bind(&p.gateway_reference)
        .bind(&p.gateway_payment_id)
        .bind(p.refunded_amount)
        .bind(&p.refund_reference)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, total_amount, currency, status, customer_name,
                   shipping_name, shipping_email, shipping_phone, shipping_address,
                   version, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<ItemRow> = sqlx::query_as(
            "SELECT order_id, product_id, product_name, quantity, unit_price
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let payment: PaymentRow = sqlx::query_as(
            r#"
            SELECT order_id, amount, currency, status, gateway, gateway_reference,
                   gateway_payment_id, refunded_amount, refund_reference, created_at, updated_at
            FROM payments WHERE order_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        assemble(row, items, payment.try_into()?).map(Some)
    }

    async fn update_order(&self, order: &Order, expected_version: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET status = $1, version = $2, updated_at = $3
             WHERE id = $4 AND version = $5",
        )
        .bind(order.status.as_db())
        .bind(order.version)
        .bind(order.updated_at)
        .bind(&order.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM orders WHERE id = $1")
                .bind(&order.id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::Conflict(order.id.clone()),
                None => StoreError::NotFound,
            });
        }

        let p = &order.payment;
        sqlx::query(
            r#"
            UPDATE payments SET
                status = $1, gateway_reference = $2, gateway_payment_id = $3,
                refunded_amount = $4, refund_reference = $5, updated_at = $6
            WHERE order_id = $7
            "#,
        )
        .bind(p.status.as_db())
        .bind(&p.gateway_reference)
        .bind(&p.gateway_payment_id)
        .bind(p.refunded_amount)
        .bind(&p.refund_reference)
        .bind(p.updated_at)
        .bind(&order.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_stale_pending(
        &self,
        created_before: i64,
        limit: i64,
    ) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM orders WHERE status = $1 AND created_at < $2
             ORDER BY created_at LIMIT $3",
        )
        .bind(OrderStatus::Pending.as_db())
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
