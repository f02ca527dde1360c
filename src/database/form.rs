use std::str::FromStr;

use super::error::{Error, TypeError};

/// Decoded query string. Keys may repeat (`tags=lunch&tags=dinner`).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    inner: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let inner: Vec<(String, String)> = serde_urlencoded::from_str(raw)
            .map_err(|_e| TypeError::new("Malformed query string"))?;

        Ok(Self { inner })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(v) if !v.is_empty() => v
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new(&format!("Invalid number for {key}")).into()),
            _ => Ok(None),
        }
    }

    pub fn get_numbers<T>(&self, key: &str) -> Result<Vec<T>, Error>
    where
        T: FromStr,
    {
        self.get_all(key)
            .into_iter()
            .map(|v| {
                v.parse()
                    .map_err(|_e| TypeError::new(&format!("Invalid number for {key}")).into())
            })
            .collect()
    }

    /// `1` and `true` switch a flag on; anything else leaves it off.
    pub fn get_flag(&self, key: &str) -> bool {
        matches!(self.get_str(key), Some("1") | Some("true"))
    }
}
