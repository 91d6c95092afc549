//! Confidence flags derived from backend responses.

use indexmap::IndexMap;

use crate::utils::truncate_chars;

/// Search returned nothing
pub const NO_SOURCES_FLAG: &str = "Не найдено источников";
/// No page could be fetched and extracted
pub const PARSE_FAILED_FLAG: &str = "Не удалось распарсить страницы";

const ERROR_FLAG_CHARS: usize = 100;

/// Flag for a run aborted by an unexpected error
pub fn error_flag(message: &str) -> String {
    format!("Ошибка: {}", truncate_chars(message, ERROR_FLAG_CHARS))
}

/// One flag per marker found in each response, tagged with the backend name.
///
/// Markers: insufficient data and no data (case-insensitive), and the
/// `ERROR` dispatch sentinel (case-sensitive).
pub fn derive_flags(analyses: &IndexMap<String, String>) -> Vec<String> {
    let mut flags = Vec::new();

    for (model, response) in analyses {
        let lowered = response.to_lowercase();
        if lowered.contains("недостаточно данных") {
            flags.push(format!("{}: недостаточно данных", model));
        }
        if lowered.contains("нет данных") {
            flags.push(format!("{}: нет данных в источниках", model));
        }
        if response.contains("ERROR") {
            flags.push(format!("{}: ошибка вызова", model));
        }
    }

    flags
}
