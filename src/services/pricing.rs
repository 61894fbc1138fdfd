//! Split economics of a cart: supplier cost, entrepreneur markup and
//! platform commission. Pure computation, no storage access.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CartViolation;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// A cart line after catalog resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingLine {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub product_base_price: Decimal,
    /// `None` when no variation was selected
    pub price_modifier: Option<Decimal>,
    pub quantity: i32,
    /// Resale price chosen by the entrepreneur
    pub unit_price: Decimal,
}

impl PricingLine {
    /// Supplier price per unit including the variation modifier.
    pub fn base_price(&self) -> Decimal {
        self.product_base_price + self.price_modifier.unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub base_price: Decimal,
    pub markup_amount: Decimal,
    pub commission_amount: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    /// Sum of `base_price * quantity`
    pub subtotal: Decimal,
    pub markup_amount: Decimal,
    pub commission_amount: Decimal,
    pub shipping_fee: Decimal,
    /// Sum of `unit_price * quantity` plus shipping
    pub total_amount: Decimal,
}

impl Quote {
    /// Total the entrepreneur is owed once the order is paid.
    pub fn entrepreneur_earnings(&self) -> Decimal {
        self.markup_amount + self.commission_amount
    }
}

/// Prices carts for one entrepreneur.
#[derive(Debug, Clone, Copy)]
pub struct PricingEngine {
    /// Percentage, e.g. `8.00` for 8%
    commission_rate: Decimal,
    shipping_fee: Decimal,
}

impl PricingEngine {
    pub fn new(commission_rate: Decimal, shipping_fee: Decimal) -> Self {
        Self {
            commission_rate,
            shipping_fee,
        }
    }

    /// Commission on one line, rounded to cents.
    pub fn line_commission(&self, unit_price: Decimal, quantity: i32) -> Decimal {
        (unit_price * Decimal::from(quantity) * self.commission_rate / HUNDRED).round_dp(2)
    }

    /// Prices every line. A line priced below supplier cost is an
    /// `InvalidPricing` violation; all such lines are reported together.
    pub fn quote(&self, lines: &[PricingLine]) -> Result<Quote, Vec<CartViolation>> {
        let mut violations = Vec::new();
        let mut priced = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let base_price = line.base_price();
            if line.unit_price < base_price {
                violations.push(CartViolation::InvalidPricing {
                    line: index,
                    product_id: line.product_id,
                    base_price,
                    unit_price: line.unit_price,
                });
                continue;
            }

            let quantity = Decimal::from(line.quantity);
            priced.push(PricedLine {
                product_id: line.product_id,
                variation_id: line.variation_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                base_price,
                markup_amount: (line.unit_price - base_price) * quantity,
                commission_amount: self.line_commission(line.unit_price, line.quantity),
                total_price: line.unit_price * quantity,
            });
        }

        if !violations.is_empty() {
            return Err(violations);
        }

        let subtotal = priced
            .iter()
            .map(|l| l.base_price * Decimal::from(l.quantity))
            .sum::<Decimal>();
        let markup_amount = priced.iter().map(|l| l.markup_amount).sum::<Decimal>();
        let commission_amount = priced.iter().map(|l| l.commission_amount).sum::<Decimal>();
        let items_total = priced.iter().map(|l| l.total_price).sum::<Decimal>();

        Ok(Quote {
            lines: priced,
            subtotal,
            markup_amount,
            commission_amount,
            shipping_fee: self.shipping_fee,
            total_amount: items_total + self.shipping_fee,
        })
    }
}
