use serde::{Deserialize, Serialize};

use kade_core::{Money, ProductId};

/// Menu section a dish belongs to.
///
/// Unknown categories coming from the backend are kept verbatim so the
/// catalog can be extended without a client release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MenuCategory {
    Base,
    Protein,
    Drink,
    Extra,
    Other(String),
}

impl MenuCategory {
    /// Display order on the POS screen.
    pub fn rank(&self) -> u8 {
        match self {
            MenuCategory::Base => 0,
            MenuCategory::Protein => 1,
            MenuCategory::Drink => 2,
            MenuCategory::Extra => 3,
            MenuCategory::Other(_) => 4,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MenuCategory::Base => "Base",
            MenuCategory::Protein => "Protein",
            MenuCategory::Drink => "Drink",
            MenuCategory::Extra => "Extra",
            MenuCategory::Other(s) => s,
        }
    }
}

impl From<String> for MenuCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Base" => MenuCategory::Base,
            "Protein" => MenuCategory::Protein,
            "Drink" => MenuCategory::Drink,
            "Extra" => MenuCategory::Extra,
            _ => MenuCategory::Other(value),
        }
    }
}

impl From<MenuCategory> for String {
    fn from(value: MenuCategory) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for MenuCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sellable dish (row of `menu_items`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub category: MenuCategory,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

/// Sort items the way the POS screen lists them: by category, then name.
pub fn sort_for_display(items: &mut [MenuItem]) {
    items.sort_by(|a, b| {
        a.category
            .rank()
            .cmp(&b.category.rank())
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_backend_row() {
        let row = r#"{"id":3,"name":"Chicken","price":450,"category":"Protein","is_available":true,"created_at":"2024-01-01T00:00:00Z"}"#;
        let item: MenuItem = serde_json::from_str(row).unwrap();
        assert_eq!(item.id, ProductId::new(3));
        assert_eq!(item.category, MenuCategory::Protein);
        assert_eq!(item.price, Money::from_units(450));
    }

    #[test]
    fn unknown_category_round_trips() {
        let cat = MenuCategory::from("Dessert".to_string());
        assert_eq!(cat, MenuCategory::Other("Dessert".into()));
        assert_eq!(String::from(cat), "Dessert");
    }

    #[test]
    fn display_order_groups_by_category() {
        let mk = |id, name: &str, cat: &str| MenuItem {
            id: ProductId::new(id),
            name: name.into(),
            price: Money::from_units(1),
            category: MenuCategory::from(cat.to_string()),
            is_available: true,
        };
        let mut items = vec![mk(1, "Tea", "Drink"), mk(2, "Rice", "Base"), mk(3, "Egg", "Protein")];
        sort_for_display(&mut items);
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Rice", "Egg", "Tea"]);
    }

    #[test]
    fn unknown_categories_sort_last_and_group_by_name() {
        let mk = |id, name: &str, cat: &str| MenuItem {
            id: ProductId::new(id),
            name: name.into(),
            price: Money::from_units(1),
            category: MenuCategory::from(cat.to_string()),
            is_available: true,
        };
        let mut items = vec![
            mk(1, "Apple pie", "Sweets"),
            mk(2, "Bun", "Bakery"),
            mk(3, "Rice", "Base"),
            mk(4, "Almond cake", "Bakery"),
        ];
        sort_for_display(&mut items);
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Rice", "Almond cake", "Bun", "Apple pie"]);
    }
}
