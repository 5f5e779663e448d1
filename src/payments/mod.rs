//! Credit purchases through Razorpay
//!
//! Orders are created server-side for a fixed plan; a verified checkout
//! signature completes the order and grants the plan's paid credits.

mod razorpay;
mod store;

use serde::Serialize;
use thiserror::Error;

pub use razorpay::{sign, verify_signature, RazorpayClient, RazorpayOrder};
pub use store::{Completion, NewOrder, PaymentOrder, PaymentRepository};

/// Payment errors
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid Signature")]
    InvalidSignature,

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("{0}")]
    Provider(String),
}

/// A purchasable credit pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPlan {
    pub id: &'static str,
    pub name: &'static str,
    pub credits: u32,
    /// Price in whole rupees
    pub price: u32,
}

impl CreditPlan {
    /// Price in paise
    pub fn amount_paise(&self) -> u64 {
        u64::from(self.price) * 100
    }
}

pub const PLANS: [CreditPlan; 3] = [
    CreditPlan {
        id: "starter",
        name: "Starter Pack",
        credits: 10,
        price: 29,
    },
    CreditPlan {
        id: "pro",
        name: "Pro Pack",
        credits: 50,
        price: 99,
    },
    CreditPlan {
        id: "power",
        name: "Power User",
        credits: 200,
        price: 299,
    },
];

/// Look up a plan by id
pub fn find_plan(plan_id: &str) -> Result<&'static CreditPlan, PaymentError> {
    PLANS
        .iter()
        .find(|p| p.id == plan_id)
        .ok_or_else(|| PaymentError::UnknownPlan(plan_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_lookup() {
        let pro = find_plan("pro").unwrap();
        assert_eq!(pro.credits, 50);
        assert_eq!(pro.amount_paise(), 9900);
        assert!(matches!(find_plan("mega"), Err(PaymentError::UnknownPlan(_))));
    }
}
