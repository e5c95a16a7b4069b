//! Pricing Calculator
//!
//! Maps {shipping choice, selected add-ons, diagnostic flag} to an itemized
//! cart. Pure computation: no I/O, no clock.
//!
//! ```text
//! total = price(shipping) + Σ price(add-on)      (normal)
//! total = 5.00                                    (diagnostic)
//! ```
//!
//! Diagnostic mode exists to push a real, minimal payment through the
//! provider so the purchase pixels can be verified end to end.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::model::LineItem;

/// Fixed total charged in diagnostic mode
pub const DIAGNOSTIC_TOTAL: Decimal = dec!(5.00);

/// Smallest line price the provider accepts
pub const MIN_ITEM_PRICE: Decimal = dec!(0.01);

/// Value reported with InitiateCheckout when the cart is still empty (PAC)
pub const FALLBACK_CHECKOUT_VALUE: Decimal = dec!(12.80);

pub const MAIN_PRODUCT_ID: &str = "kit-pampers-premium";
pub const MAIN_PRODUCT_NAME: &str = "Kit Pampers Premium";
pub const PRODUCT_CATEGORY: &str = "Baby Products";

const DIAGNOSTIC_ITEM_ID: &str = "test-purchase-real";

/// Shipping methods offered at step 2
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    Full,
    Sedex,
    Pac,
}

impl ShippingMethod {
    pub const ALL: [ShippingMethod; 3] =
        [ShippingMethod::Full, ShippingMethod::Sedex, ShippingMethod::Pac];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Full => "full",
            ShippingMethod::Sedex => "sedex",
            ShippingMethod::Pac => "pac",
        }
    }

    /// Lenient parse; unrecognized keys are `None` and price at zero
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Some(ShippingMethod::Full),
            "sedex" => Some(ShippingMethod::Sedex),
            "pac" => Some(ShippingMethod::Pac),
            _ => None,
        }
    }

    pub fn price(&self) -> Decimal {
        match self {
            ShippingMethod::Full => dec!(24.90),
            ShippingMethod::Sedex => dec!(19.90),
            ShippingMethod::Pac => dec!(12.80),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ShippingMethod::Full => "Frete Full (Receba em Até 24hrs)",
            ShippingMethod::Sedex => "Correios (SEDEX)",
            ShippingMethod::Pac => "Correios (PAC)",
        }
    }
}

/// Price of an optional shipping selection
pub fn shipping_price(method: Option<ShippingMethod>) -> Decimal {
    method.map_or(Decimal::ZERO, |m| m.price())
}

/// An order bump offered next to the main product
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderBump {
    pub id: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub price: Decimal,
}

impl OrderBump {
    pub fn content_id(&self) -> String {
        format!("order-bump-{}", self.id)
    }
}

/// The fixed add-on catalog
pub static ORDER_BUMPS: [OrderBump; 3] = [
    OrderBump {
        id: 1,
        title: "12 pacotes extra de lenços",
        description: "48uni em cada pacote (Receba tudo no mesmo frete)",
        price: dec!(25.08),
    },
    OrderBump {
        id: 2,
        title: "Shampoo Sabonete Condicionador",
        description: "Kit completo de higiene para seu bebê",
        price: dec!(16.17),
    },
    OrderBump {
        id: 3,
        title: "Kit Higiene Cuidados Saúde Bebê",
        description: "Tudo que você precisa para cuidar da saúde do seu bebê com Zeep",
        price: dec!(19.00),
    },
];

/// Resolve an add-on id against the catalog
pub fn find_bump(id: u32) -> Option<&'static OrderBump> {
    ORDER_BUMPS.iter().find(|b| b.id == id)
}

/// Price contribution of an add-on; unknown ids and diagnostic mode yield zero
pub fn bump_price(id: u32, diagnostic: bool) -> Decimal {
    if diagnostic {
        return Decimal::ZERO;
    }
    find_bump(id).map_or(Decimal::ZERO, |b| b.price)
}

/// Selection made by the customer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSelection {
    /// Raw shipping key as sent by the page
    #[serde(default)]
    pub shipping: Option<String>,

    #[serde(default)]
    pub bumps: BTreeSet<u32>,

    #[serde(default)]
    pub test_mode: bool,
}

/// Itemized cart with total
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cart {
    pub shipping: Option<ShippingMethod>,
    pub shipping_price: Decimal,
    /// Catalog ids that resolved; unknown ids are dropped
    pub bumps: Vec<u32>,
    pub items: Vec<LineItem>,
    pub total: Decimal,
    pub test_mode: bool,
}

impl Cart {
    pub fn is_chargeable(&self) -> bool {
        self.total > Decimal::ZERO && !self.items.is_empty()
    }

    /// External id prefix that marks diagnostic payments at the provider
    pub fn external_id_prefix(&self) -> &'static str {
        if self.test_mode { "test-real" } else { "pampers" }
    }
}

/// Order total for a selection
pub fn total(shipping: Option<ShippingMethod>, bumps: &BTreeSet<u32>, diagnostic: bool) -> Decimal {
    if diagnostic {
        return DIAGNOSTIC_TOTAL;
    }
    shipping_price(shipping) + bumps.iter().map(|id| bump_price(*id, false)).sum::<Decimal>()
}

/// Build the itemized cart for a selection
pub fn quote(selection: &CartSelection) -> Cart {
    let shipping = selection.shipping.as_deref().and_then(ShippingMethod::parse);

    if selection.test_mode {
        return Cart {
            shipping,
            shipping_price: DIAGNOSTIC_TOTAL,
            bumps: Vec::new(),
            items: vec![LineItem {
                id: DIAGNOSTIC_ITEM_ID.into(),
                title: "🧪 Teste Real - Purchase Event".into(),
                description: "Pagamento para gerar evento Purchase real nos pixels".into(),
                price: DIAGNOSTIC_TOTAL,
                quantity: 1,
                is_physical: false,
            }],
            total: DIAGNOSTIC_TOTAL,
            test_mode: true,
        };
    }

    let resolved: Vec<&OrderBump> = selection.bumps.iter().filter_map(|id| find_bump(*id)).collect();
    let ship_price = shipping_price(shipping);

    let mut items = vec![LineItem {
        id: MAIN_PRODUCT_ID.into(),
        title: "Kit Pampers Premium - Produto Gratuito".into(),
        description: "9 Pacotes de Fraldas + 6 Pacotes de Lenços (Apenas pague o frete)".into(),
        price: MIN_ITEM_PRICE,
        quantity: 1,
        is_physical: true,
    }];

    if let Some(method) = shipping {
        items.push(LineItem {
            id: format!("shipping-{}", method.as_str()),
            title: method.title().into(),
            description: "Frete para entrega do produto".into(),
            price: ship_price,
            quantity: 1,
            is_physical: false,
        });
    }

    items.extend(resolved.iter().map(|bump| LineItem {
        id: bump.content_id(),
        title: bump.title.into(),
        description: bump.description.into(),
        price: bump.price,
        quantity: 1,
        is_physical: true,
    }));

    // The product line carries the provider minimum; take it back out of the
    // first paid line so the lines sum to the total.
    if let Some(first_paid) = items.iter_mut().skip(1).find(|i| i.price >= MIN_ITEM_PRICE) {
        first_paid.price -= MIN_ITEM_PRICE;
    }

    Cart {
        shipping,
        shipping_price: ship_price,
        bumps: resolved.iter().map(|b| b.id).collect(),
        items,
        total: total(shipping, &selection.bumps, false),
        test_mode: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(shipping: Option<&str>, bumps: &[u32], test_mode: bool) -> CartSelection {
        CartSelection {
            shipping: shipping.map(String::from),
            bumps: bumps.iter().copied().collect(),
            test_mode,
        }
    }

    #[test]
    fn test_total_for_every_method_and_subset() {
        let methods = [None, Some("full"), Some("sedex"), Some("pac"), Some("drone")];
        let universe = [1u32, 2, 3, 42];

        for method in methods {
            let expected_ship = method
                .and_then(ShippingMethod::parse)
                .map_or(Decimal::ZERO, |m| m.price());

            for mask in 0..(1 << universe.len()) {
                let bumps: Vec<u32> = universe
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, id)| *id)
                    .collect();
                let expected_bumps: Decimal = bumps
                    .iter()
                    .filter_map(|id| find_bump(*id))
                    .map(|b| b.price)
                    .sum();

                let cart = quote(&selection(method, &bumps, false));
                assert_eq!(cart.total, expected_ship + expected_bumps, "{method:?} {bumps:?}");
            }
        }
    }

    #[test]
    fn test_unknown_inputs_contribute_zero() {
        let cart = quote(&selection(Some("teleport"), &[99, 100], false));
        assert_eq!(cart.total, Decimal::ZERO);
        assert!(cart.bumps.is_empty());
        assert!(!cart.is_chargeable());
    }

    #[test]
    fn test_diagnostic_mode_is_fixed() {
        for method in [None, Some("full"), Some("pac")] {
            let cart = quote(&selection(method, &[1, 2, 3], true));
            assert_eq!(cart.total, DIAGNOSTIC_TOTAL);
            assert!(cart.bumps.is_empty());
            assert_eq!(cart.items.len(), 1);
            assert_eq!(cart.external_id_prefix(), "test-real");
        }
        assert_eq!(bump_price(1, true), Decimal::ZERO);
    }

    #[test]
    fn test_diagnostic_flag_does_not_leak_into_normal_pricing() {
        let _ = quote(&selection(Some("sedex"), &[2], true));
        let cart = quote(&selection(Some("sedex"), &[2], false));
        assert_eq!(cart.total, dec!(19.90) + dec!(16.17));
        assert_eq!(cart.external_id_prefix(), "pampers");
    }

    #[test]
    fn test_line_items_sum_to_total() {
        for (method, bumps) in [
            (Some("full"), vec![]),
            (Some("pac"), vec![1, 3]),
            (None, vec![2]),
            (None, vec![1, 2, 3]),
        ] {
            let cart = quote(&selection(method, &bumps, false));
            let sum: Decimal = cart.items.iter().map(LineItem::subtotal).sum();
            assert_eq!(sum, cart.total, "{method:?} {bumps:?}");
        }
    }

    #[test]
    fn test_shipping_line_absorbs_product_minimum() {
        let cart = quote(&selection(Some("full"), &[], false));
        assert_eq!(cart.items[0].price, MIN_ITEM_PRICE);
        assert_eq!(cart.items[1].id, "shipping-full");
        assert_eq!(cart.items[1].price, dec!(24.89));
    }
}
