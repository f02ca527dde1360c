use crate::{
    constants::MAX_NAME_LENGTH,
    error::TypeError,
    schema::{MeasurementUnit, NewIngredient},
};

/*
Ingredient dump, one ingredient per line, unit in the last column:

абрикосовое варенье,г
"соус ""Тартар"", острый",г
egg,piece
*/

pub fn parse_ingredient_line(line: &str) -> Result<NewIngredient, TypeError> {
    let (name, unit) = line
        .trim()
        .rsplit_once(',')
        .ok_or_else(|| TypeError::new("Invalid syntax; Expected `name,unit`"))?;

    let name = unquote(name.trim());
    if name.is_empty() {
        return Err(TypeError::new("Invalid syntax; Empty name"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(TypeError::new("Invalid syntax; Name is too long"));
    }

    let measurement_unit: MeasurementUnit = unquote(unit.trim()).parse()?;

    Ok(NewIngredient {
        name,
        measurement_unit,
    })
}

/// Parses a whole dump. Blank lines are skipped; the first bad line aborts
/// with its 1-based line number.
pub fn parse_ingredients(data: &str) -> Result<Vec<NewIngredient>, TypeError> {
    data.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            parse_ingredient_line(line)
                .map_err(|e| TypeError::new(&format!("Line {}: {e}", n + 1)))
        })
        .collect()
}

fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => value.to_owned(),
    }
}
