use std::collections::HashMap;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::db::{portfolio_queries, price_queries};
use crate::errors::AppError;
use crate::models::{Holding, Portfolio, PortfolioValuation};
use crate::services::job_scheduler_service::{JobContext, JobResult};

/// Value every active portfolio at the latest stored prices and persist one
/// valuation row per portfolio. A failure for one portfolio is counted, not
/// fatal to the run.
pub async fn update_portfolio_values(ctx: JobContext) -> Result<JobResult, AppError> {
    let portfolios = portfolio_queries::fetch_active_portfolios(&ctx.pool).await?;
    if portfolios.is_empty() {
        info!("no active portfolios to value");
        return Ok(JobResult {
            items_processed: 0,
            items_failed: 0,
        });
    }

    let prices: HashMap<String, f64> = price_queries::fetch_latest_prices(&ctx.pool)
        .await?
        .into_iter()
        .map(|p| (p.symbol, p.price_usd))
        .collect();

    let mut processed = 0;
    let mut failed = 0;

    for portfolio in &portfolios {
        match value_portfolio(&ctx.pool, portfolio, &prices).await {
            Ok(valuation) => {
                if valuation.missing_prices > 0 {
                    warn!(
                        portfolio = %portfolio.name,
                        missing_prices = valuation.missing_prices,
                        "portfolio valued with missing prices"
                    );
                }
                processed += 1;
            }
            Err(e) => {
                error!(portfolio = %portfolio.name, error = %e, "failed to value portfolio");
                failed += 1;
            }
        }
    }

    info!(processed, failed, "portfolio valuation completed");

    Ok(JobResult {
        items_processed: processed,
        items_failed: failed,
    })
}

async fn value_portfolio(
    pool: &PgPool,
    portfolio: &Portfolio,
    prices: &HashMap<String, f64>,
) -> Result<PortfolioValuation, AppError> {
    let holdings = portfolio_queries::fetch_holdings(pool, portfolio.id).await?;
    let (total_value_usd, priced_assets, missing_prices) = value_holdings(&holdings, prices);

    if holdings.is_empty() {
        debug!(portfolio = %portfolio.name, "portfolio has no holdings");
    }

    let valuation = PortfolioValuation {
        portfolio_id: portfolio.id,
        total_value_usd,
        priced_assets,
        missing_prices,
        valued_at: Utc::now(),
    };
    portfolio_queries::insert_valuation(pool, &valuation).await?;
    Ok(valuation)
}

/// Sum holding values at the given prices. Holdings without a known price
/// contribute nothing to the total and are counted separately.
fn value_holdings(holdings: &[Holding], prices: &HashMap<String, f64>) -> (f64, i32, i32) {
    let mut total = 0.0;
    let mut priced = 0;
    let mut missing = 0;

    for holding in holdings {
        match prices.get(&holding.symbol) {
            Some(price) => {
                total += holding.quantity * price;
                priced += 1;
            }
            None => missing += 1,
        }
    }

    (total, priced, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn holding(symbol: &str, quantity: f64) -> Holding {
        Holding {
            id: Uuid::new_v4(),
            portfolio_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_value_holdings_sums_priced_assets() {
        let holdings = vec![holding("bitcoin", 0.5), holding("ethereum", 2.0)];
        let prices = HashMap::from([
            ("bitcoin".to_string(), 64000.0),
            ("ethereum".to_string(), 3000.0),
        ]);

        let (total, priced, missing) = value_holdings(&holdings, &prices);
        assert_eq!(total, 38000.0);
        assert_eq!(priced, 2);
        assert_eq!(missing, 0);
    }

    #[test]
    fn test_value_holdings_counts_missing_prices() {
        let holdings = vec![holding("bitcoin", 1.0), holding("obscure-token", 100.0)];
        let prices = HashMap::from([("bitcoin".to_string(), 64000.0)]);

        let (total, priced, missing) = value_holdings(&holdings, &prices);
        assert_eq!(total, 64000.0);
        assert_eq!(priced, 1);
        assert_eq!(missing, 1);
    }

    #[test]
    fn test_value_holdings_empty() {
        let (total, priced, missing) = value_holdings(&[], &HashMap::new());
        assert_eq!(total, 0.0);
        assert_eq!(priced, 0);
        assert_eq!(missing, 0);
    }
}
