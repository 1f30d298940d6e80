//! Purchasable offers.
//!
//! An offer is what the payer sees at checkout; a plan is what the license
//! records. Both annual offers grant the same annual plan.

use serde::Serialize;

use crate::domain::foundation::{DomainError, ErrorCode};

use super::Plan;

/// A priced checkout option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offer {
    pub id: &'static str,
    pub plan: Plan,
    pub title: &'static str,
    pub description: &'static str,

    /// Total price in the smallest currency unit.
    pub amount_cents: u64,
    pub currency: &'static str,

    /// Maximum number of installments the payer may split the total into.
    pub installments: u8,
}

impl Offer {
    /// Price formatted as a decimal string, e.g. `"394.80"`.
    pub fn amount_decimal(&self) -> String {
        format!("{}.{:02}", self.amount_cents / 100, self.amount_cents % 100)
    }
}

static OFFERS: [Offer; 3] = [
    Offer {
        id: "monthly",
        plan: Plan::Monthly,
        title: "Plano Mensal - Anota & Ganha",
        description: "Acesso ilimitado por 1 mês",
        amount_cents: 3_900,
        currency: "BRL",
        installments: 1,
    },
    Offer {
        id: "annual_installments",
        plan: Plan::Annual,
        title: "Plano Anual Parcelado",
        description: "Acesso ilimitado por 1 ano - 12x",
        amount_cents: 39_480,
        currency: "BRL",
        installments: 12,
    },
    Offer {
        id: "annual_upfront",
        plan: Plan::Annual,
        title: "Plano Anual à Vista",
        description: "Acesso ilimitado por 1 ano",
        amount_cents: 36_000,
        currency: "BRL",
        installments: 1,
    },
];

/// The fixed set of offers sold through the gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferCatalog;

impl OfferCatalog {
    pub fn all(&self) -> &'static [Offer] {
        &OFFERS
    }

    /// Looks up an offer by id.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOffer` if no offer has that id.
    pub fn get(&self, offer_id: &str) -> Result<&'static Offer, DomainError> {
        OFFERS
            .iter()
            .find(|offer| offer.id == offer_id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::UnknownOffer, format!("Unknown offer: {}", offer_id))
                    .with_detail("offer_id", offer_id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annual_offers_both_grant_annual_plan() {
        let catalog = OfferCatalog;
        assert_eq!(catalog.get("annual_installments").unwrap().plan, Plan::Annual);
        assert_eq!(catalog.get("annual_upfront").unwrap().plan, Plan::Annual);
        assert_eq!(catalog.get("monthly").unwrap().plan, Plan::Monthly);
    }

    #[test]
    fn amounts_format_as_decimal() {
        let catalog = OfferCatalog;
        assert_eq!(catalog.get("monthly").unwrap().amount_decimal(), "39.00");
        assert_eq!(
            catalog.get("annual_installments").unwrap().amount_decimal(),
            "394.80"
        );
    }

    #[test]
    fn unknown_offer_is_rejected() {
        let err = OfferCatalog.get("weekly").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownOffer);
    }

    #[test]
    fn every_offer_is_purchasable() {
        assert!(OfferCatalog.all().iter().all(|offer| offer.plan.is_purchasable()));
    }
}
