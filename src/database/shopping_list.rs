use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    constants::SHOPPING_LIST_SUFFIX,
    error::{Error, HtmlError},
    schema::{Id, MeasurementUnit},
};

/// One ingredient line of a recipe in a cart.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub recipe_id: Id,
    pub name: String,
    pub measurement_unit: MeasurementUnit,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRecipe {
    pub recipe_id: Id,
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: MeasurementUnit,
    pub total: i64,
}

/// Groups every line of the cart by ingredient name and unit and sums the
/// amounts. Two ingredient records sharing name and unit end up on one line.
pub fn aggregate(cart: &[CartRecipe]) -> Result<Vec<ShoppingListItem>, Error> {
    if cart.is_empty() {
        return Err(HtmlError::EmptyAggregation.default());
    }

    let mut totals: BTreeMap<(&str, MeasurementUnit), i64> = BTreeMap::new();
    for line in cart.iter().flat_map(|recipe| recipe.lines.iter()) {
        let total = totals
            .entry((line.name.as_str(), line.measurement_unit))
            .or_insert(0);
        *total = total
            .checked_add(line.amount.into())
            .ok_or_else(|| HtmlError::InternalServerError.new("Ingredient total overflow"))?;
    }

    Ok(totals
        .into_iter()
        .map(|((name, measurement_unit), total)| ShoppingListItem {
            name: name.to_owned(),
            measurement_unit,
            total,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub owner: String,
    pub items: Vec<ShoppingListItem>,
    pub generated_at: DateTime<Utc>,
}

impl ShoppingList {
    pub fn new(owner: &str, cart: &[CartRecipe], generated_at: DateTime<Utc>) -> Result<Self, Error> {
        Ok(Self {
            owner: owner.to_owned(),
            items: aggregate(cart)?,
            generated_at,
        })
    }

    pub fn render(&self) -> String {
        let mut document = format!("Shopping list for: {}\n\n", self.owner);

        for item in self.items.iter() {
            document.push_str(&format!(
                "{}: {} {}\n",
                item.name, item.total, item.measurement_unit
            ));
        }

        document.push_str(&format!(
            "\nFoodgram, {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));
        document
    }
}

/// Attachment name for a user's shopping list. Characters that would break
/// the `Content-Disposition` header are replaced.
pub fn shopping_list_filename(username: &str) -> String {
    let safe: String = username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{safe}{SHOPPING_LIST_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    fn line(recipe_id: Id, name: &str, unit: MeasurementUnit, amount: i32) -> CartLine {
        CartLine {
            recipe_id,
            name: name.to_owned(),
            measurement_unit: unit,
            amount,
        }
    }

    fn recipe(recipe_id: Id, lines: Vec<CartLine>) -> CartRecipe {
        CartRecipe { recipe_id, lines }
    }

    fn as_set(items: Vec<ShoppingListItem>) -> HashSet<(String, MeasurementUnit, i64)> {
        items
            .into_iter()
            .map(|i| (i.name, i.measurement_unit, i.total))
            .collect()
    }

    #[test]
    fn merges_lines_across_recipes() {
        let cart = vec![
            recipe(1, vec![line(1, "flour", MeasurementUnit::G, 200)]),
            recipe(
                2,
                vec![
                    line(2, "flour", MeasurementUnit::G, 100),
                    line(2, "egg", MeasurementUnit::Piece, 2),
                ],
            ),
        ];

        let expected: HashSet<_> = [
            (String::from("flour"), MeasurementUnit::G, 300),
            (String::from("egg"), MeasurementUnit::Piece, 2),
        ]
        .into_iter()
        .collect();
        assert_eq!(as_set(aggregate(&cart).unwrap()), expected);
    }

    #[test]
    fn total_is_the_sum_regardless_of_order() {
        let amounts = [3, 17, 250, 1, 42, 9];
        let mut cart: Vec<CartRecipe> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| recipe(i as Id, vec![line(i as Id, "milk", MeasurementUnit::Ml, *amount)]))
            .collect();

        let forward = aggregate(&cart).unwrap();
        cart.reverse();
        let backward = aggregate(&cart).unwrap();

        let sum: i64 = amounts.iter().map(|a| *a as i64).sum();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].total, sum);
    }

    #[test]
    fn same_name_different_unit_stays_apart() {
        let cart = vec![recipe(
            1,
            vec![
                line(1, "sugar", MeasurementUnit::G, 50),
                line(1, "sugar", MeasurementUnit::Kg, 1),
            ],
        )];
        assert_eq!(aggregate(&cart).unwrap().len(), 2);
    }

    #[test]
    fn empty_cart_is_an_error() {
        let err = aggregate(&[]).unwrap_err();
        assert_eq!(err.kind, HtmlError::EmptyAggregation);
        assert!(ShoppingList::new("cook", &[], Utc::now()).is_err());
    }

    #[test]
    fn totals_exceed_i32() {
        let cart: Vec<CartRecipe> = (0..3)
            .map(|i| recipe(i, vec![line(i, "rice", MeasurementUnit::G, i32::MAX)]))
            .collect();
        let items = aggregate(&cart).unwrap();
        assert_eq!(items[0].total, 3 * i32::MAX as i64);
    }

    #[test]
    fn renders_document() {
        let cart = vec![recipe(
            1,
            vec![
                line(1, "flour", MeasurementUnit::G, 300),
                line(1, "egg", MeasurementUnit::Piece, 2),
            ],
        )];
        let generated_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let list = ShoppingList::new("Ada", &cart, generated_at).unwrap();
        let document = list.render();

        assert!(document.starts_with("Shopping list for: Ada\n"));
        assert!(document.contains("flour: 300 g\n"));
        assert!(document.contains("egg: 2 piece\n"));
        assert!(document.ends_with("Foodgram, 2024-05-01 12:30 UTC\n"));
    }

    #[test]
    fn filename_is_header_safe() {
        assert_eq!(shopping_list_filename("cook42"), "cook42_shopping_list.txt");
        assert_eq!(shopping_list_filename("a b\"c"), "a_b_c_shopping_list.txt");
    }
}
