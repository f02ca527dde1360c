pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const SUBSCRIPTION_COUNT_PER_PAGE: i64 = 6;
pub const MAX_COUNT_PER_PAGE: i64 = 100;

pub const MIN_COOKING_TIME: i64 = 1;
pub const MAX_COOKING_TIME: i64 = 600;

pub const MIN_INGREDIENT_AMOUNT: i64 = 1;
pub const MAX_INGREDIENT_AMOUNT: i64 = 32_767;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_COLOR_LENGTH: usize = 7;

pub const MIN_USERNAME_LENGTH: usize = 5;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const RESERVED_USERNAMES: &[&str] = &["me"];

pub const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

pub const IMAGE_TYPES: &[(&str, &[u8])] = &[
    ("png", b"\x89PNG\r\n\x1a\n"),
    ("jpg", b"\xff\xd8\xff"),
    ("gif", b"GIF8"),
];

pub const SHOPPING_LIST_SUFFIX: &str = "_shopping_list.txt";
