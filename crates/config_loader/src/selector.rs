//! 设备选择器语法
//!
//! `key:value[,key:value]*`. Real backends accept `serial`, `user_id`,
//! `index`; webcams accept `id`, `index`, `name_contains`.

use contracts::{ContractError, DeviceSelector};

/// Which key set the selector is parsed against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorFlavor {
    Real,
    Webcam,
}

impl SelectorFlavor {
    fn allowed_keys(self) -> &'static [&'static str] {
        match self {
            Self::Real => &["serial", "user_id", "index"],
            Self::Webcam => &["id", "index", "name_contains"],
        }
    }
}

/// Parse a selector string
///
/// # Errors
/// Empty clause, missing `:`, empty value, unknown or duplicate key, a
/// non-decimal `index`, or both `serial` and `user_id`.
pub fn parse_device_selector(
    input: &str,
    flavor: SelectorFlavor,
) -> Result<DeviceSelector, ContractError> {
    let fail = |message: String| ContractError::selector(input, message);

    if input.trim().is_empty() {
        return Err(fail("selector cannot be empty".into()));
    }

    let mut selector = DeviceSelector::default();
    let mut seen: Vec<&str> = Vec::new();

    for (position, raw) in input.split(',').enumerate() {
        let clause = raw.trim();
        if clause.is_empty() {
            return Err(fail(format!("clause {} is empty", position + 1)));
        }

        let Some((key, value)) = clause.split_once(':') else {
            return Err(fail(format!("clause '{clause}' must be key:value")));
        };
        let key = key.trim();
        let value = value.trim();

        if !flavor.allowed_keys().contains(&key) {
            return Err(fail(format!(
                "unknown key '{key}', expected one of {}",
                flavor.allowed_keys().join(", ")
            )));
        }
        if seen.contains(&key) {
            return Err(fail(format!("duplicate key '{key}'")));
        }
        seen.push(key);

        if value.is_empty() {
            return Err(fail(format!("value for '{key}' cannot be empty")));
        }

        let value = value.to_string();
        match key {
            "serial" => selector.serial = Some(value),
            "user_id" => selector.user_id = Some(value),
            "id" => selector.id = Some(value),
            "index" => selector.index = Some(parse_index(&value).map_err(fail)?),
            _ => selector.name_contains = Some(value),
        }
    }

    if selector.serial.is_some() && selector.user_id.is_some() {
        return Err(fail("serial and user_id are mutually exclusive".into()));
    }

    Ok(selector)
}

fn parse_index(value: &str) -> Result<u32, String> {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("index must be a non-negative decimal integer, got '{value}'"));
    }
    value
        .parse::<u32>()
        .map_err(|_| format!("index out of range: '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(input: &str) -> Result<DeviceSelector, ContractError> {
        parse_device_selector(input, SelectorFlavor::Real)
    }

    #[test]
    fn test_parse_real_selector() {
        let selector = real("serial:SN-001, index:2").unwrap();
        assert_eq!(selector.serial.as_deref(), Some("SN-001"));
        assert_eq!(selector.index, Some(2));
    }

    #[test]
    fn test_parse_webcam_selector() {
        let selector =
            parse_device_selector("name_contains:Logi,index:0", SelectorFlavor::Webcam).unwrap();
        assert_eq!(selector.name_contains.as_deref(), Some("Logi"));
        assert_eq!(selector.index, Some(0));
    }

    #[test]
    fn test_value_may_contain_colon() {
        let selector = real("user_id:lab:cam1").unwrap();
        assert_eq!(selector.user_id.as_deref(), Some("lab:cam1"));
    }

    #[test]
    fn test_rejects_grammar_errors() {
        let cases = [
            ("", "cannot be empty"),
            ("serial:A,,index:1", "empty"),
            ("serial", "key:value"),
            ("serial:A,serial:B", "duplicate"),
            ("id:cam0", "unknown key"),
            ("index:-1", "non-negative decimal"),
            ("index:0x10", "non-negative decimal"),
            ("serial:A,user_id:B", "mutually exclusive"),
            ("serial:", "cannot be empty"),
        ];
        for (input, needle) in cases {
            let err = real(input).unwrap_err().to_string();
            assert!(err.contains(needle), "input {input:?} gave {err}");
        }
    }

    #[test]
    fn test_webcam_rejects_serial() {
        let err = parse_device_selector("serial:A", SelectorFlavor::Webcam).unwrap_err();
        assert!(err.to_string().contains("unknown key"));
    }
}
