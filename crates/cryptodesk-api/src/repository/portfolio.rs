//! 포트폴리오 저장소.
//!
//! portfolios, positions, trades 테이블에 대한 데이터베이스 작업을 처리합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use cryptodesk_core::services::portfolio::update_portfolio_positions;
use cryptodesk_core::{PositionSnapshot, TradeRecord};

/// 포트폴리오 레코드.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PortfolioRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub total_value: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 포지션 레코드.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PositionRecord {
    pub id: i64,
    pub portfolio_id: i64,
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: Option<f64>,
    pub unrealized_pnl: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PositionRecord {
    /// 계산용 스냅샷. 현재가가 없으면 평균 단가를 사용합니다.
    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot::new(
            self.symbol.clone(),
            self.quantity,
            self.average_price,
            self.current_price.unwrap_or(self.average_price),
        )
    }
}

/// 거래 레코드.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRow {
    pub id: i64,
    pub user_id: i64,
    pub portfolio_id: Option<i64>,
    pub exchange: String,
    pub market: String,
    pub side: String,
    pub order_type: String,
    pub amount: f64,
    pub price: Option<f64>,
    pub filled_amount: f64,
    pub filled_price: Option<f64>,
    pub status: String,
    pub exchange_order_id: Option<String>,
    pub fee: f64,
    pub simulated: bool,
    pub created_at: DateTime<Utc>,
}

impl TradeRow {
    /// base 심볼 (BTC-EUR → BTC).
    pub fn symbol(&self) -> &str {
        self.market.split('-').next().unwrap_or(&self.market)
    }
}

/// 체결이 한 심볼의 포지션에 남기는 변화.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    /// 새 수량과 평균 단가로 저장
    Upsert(PositionSnapshot),
    /// 전량 매도로 포지션 제거
    Close(String),
}

/// 체결을 기존 포지션에 반영한 결과.
///
/// 체결 수량이나 체결가가 없으면, 또는 보유하지 않은 심볼을 매도하면 `None`.
pub fn position_change(existing: &[PositionSnapshot], trade: &TradeRecord) -> Option<PositionChange> {
    let price = trade.filled_price.or(trade.price).filter(|p| *p > 0.0)?;
    if trade.filled_amount <= 0.0 {
        return None;
    }

    let symbol = trade.symbol();
    let held = existing.iter().any(|p| p.symbol == symbol);
    let updated = update_portfolio_positions(existing, symbol, trade.side, trade.filled_amount, price);

    match updated.into_iter().find(|p| p.symbol == symbol) {
        Some(position) => Some(PositionChange::Upsert(position)),
        None if held => Some(PositionChange::Close(symbol.to_string())),
        None => None,
    }
}

/// 포트폴리오 저장소.
pub struct PortfolioRepository;

impl PortfolioRepository {
    /// 포트폴리오 생성.
    pub async fn create(
        pool: &PgPool,
        user_id: i64,
        name: &str,
        description: &str,
    ) -> Result<PortfolioRecord, sqlx::Error> {
        sqlx::query_as::<_, PortfolioRecord>(
            r#"
            INSERT INTO portfolios (user_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .await
    }

    /// 사용자의 활성 포트폴리오 목록.
    pub async fn list_by_user(pool: &PgPool, user_id: i64) -> Result<Vec<PortfolioRecord>, sqlx::Error> {
        sqlx::query_as::<_, PortfolioRecord>(
            r#"
            SELECT * FROM portfolios
            WHERE user_id = $1 AND is_active = true
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        user_id: i64,
        portfolio_id: i64,
    ) -> Result<Option<PortfolioRecord>, sqlx::Error> {
        sqlx::query_as::<_, PortfolioRecord>("SELECT * FROM portfolios WHERE id = $1 AND user_id = $2")
            .bind(portfolio_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// 포트폴리오의 포지션.
    pub async fn positions(pool: &PgPool, portfolio_id: i64) -> Result<Vec<PositionRecord>, sqlx::Error> {
        sqlx::query_as::<_, PositionRecord>(
            "SELECT * FROM positions WHERE portfolio_id = $1 ORDER BY symbol",
        )
        .bind(portfolio_id)
        .fetch_all(pool)
        .await
    }

    /// 포트폴리오의 거래 내역 (최신순).
    pub async fn trades(
        pool: &PgPool,
        user_id: i64,
        portfolio_id: i64,
        limit: i64,
    ) -> Result<Vec<TradeRow>, sqlx::Error> {
        sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT * FROM trades
            WHERE portfolio_id = $1 AND user_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(portfolio_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// 현재가 갱신 및 미실현 손익 재계산.
    pub async fn update_position_price(
        pool: &PgPool,
        position_id: i64,
        current_price: f64,
    ) -> Result<PositionRecord, sqlx::Error> {
        sqlx::query_as::<_, PositionRecord>(
            r#"
            UPDATE positions
            SET current_price = $2,
                unrealized_pnl = ($2 - average_price) * quantity,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(position_id)
        .bind(current_price)
        .fetch_one(pool)
        .await
    }

    pub async fn set_total_value(pool: &PgPool, portfolio_id: i64, total_value: f64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE portfolios SET total_value = $2, updated_at = NOW() WHERE id = $1")
            .bind(portfolio_id)
            .bind(total_value)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 주문 결과를 거래 내역으로 기록.
    ///
    /// 시뮬레이션 주문도 같은 스키마로 저장되며 `simulated`로 구분합니다.
    /// 포트폴리오가 지정되면 같은 트랜잭션에서 해당 심볼의 포지션도 갱신합니다.
    pub async fn record_trade(
        pool: &PgPool,
        user_id: i64,
        portfolio_id: Option<i64>,
        exchange: &str,
        trade: &TradeRecord,
    ) -> Result<TradeRow, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row = sqlx::query_as::<_, TradeRow>(
            r#"
            INSERT INTO trades (
                user_id, portfolio_id, exchange, market, side, order_type,
                amount, price, filled_amount, filled_price, status,
                exchange_order_id, fee, simulated, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(portfolio_id)
        .bind(exchange)
        .bind(&trade.market)
        .bind(trade.side.as_str())
        .bind(trade.order_type.as_str())
        .bind(trade.amount)
        .bind(trade.price)
        .bind(trade.filled_amount)
        .bind(trade.filled_price)
        .bind(trade.status.as_str())
        .bind(&trade.exchange_order_id)
        .bind(trade.fee)
        .bind(trade.simulated)
        .bind(trade.created_at)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(portfolio_id) = portfolio_id {
            // 동시 체결이 같은 포지션을 덮어쓰지 않도록 행 잠금
            let existing: Vec<PositionRecord> = sqlx::query_as(
                "SELECT * FROM positions WHERE portfolio_id = $1 AND symbol = $2 FOR UPDATE",
            )
            .bind(portfolio_id)
            .bind(trade.symbol())
            .fetch_all(&mut *tx)
            .await?;
            let snapshots: Vec<PositionSnapshot> = existing.iter().map(PositionRecord::snapshot).collect();

            match position_change(&snapshots, trade) {
                Some(PositionChange::Upsert(position)) => {
                    sqlx::query(
                        r#"
                        INSERT INTO positions (portfolio_id, symbol, quantity, average_price, current_price)
                        VALUES ($1, $2, $3, $4, $5)
                        ON CONFLICT (portfolio_id, symbol) DO UPDATE
                        SET quantity = EXCLUDED.quantity,
                            average_price = EXCLUDED.average_price,
                            unrealized_pnl = (COALESCE(positions.current_price, EXCLUDED.average_price)
                                - EXCLUDED.average_price) * EXCLUDED.quantity,
                            updated_at = NOW()
                        "#,
                    )
                    .bind(portfolio_id)
                    .bind(&position.symbol)
                    .bind(position.amount)
                    .bind(position.average_price)
                    .bind(position.current_price)
                    .execute(&mut *tx)
                    .await?;
                }
                Some(PositionChange::Close(symbol)) => {
                    sqlx::query("DELETE FROM positions WHERE portfolio_id = $1 AND symbol = $2")
                        .bind(portfolio_id)
                        .bind(&symbol)
                        .execute(&mut *tx)
                        .await?;
                }
                None => {}
            }
        }

        tx.commit().await?;

        Ok(row)
    }
}
