use crate::error::Result;
use crate::relay_error;
use once_cell::sync::Lazy;
use regex::Regex;

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s<>"'`]+"#).unwrap_or_else(|e| panic!("Некорректный шаблон ссылки: {}", e))
});

const TRAILING: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"', '»'];

/// Ссылки из произвольного текста, без повторов, в порядке появления.
/// Если ссылок нет, возвращается сам текст.
pub fn extract_links(text: &str) -> Result<Vec<String>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(relay_error!(invalid_input, "пустой текст"));
    }

    let mut links: Vec<String> = Vec::new();
    for found in LINK_RE.find_iter(text) {
        let link = found.as_str().trim_end_matches(TRAILING);
        if !links.iter().any(|l| l == link) {
            links.push(link.to_string());
        }
    }

    if links.is_empty() {
        links.push(text.to_string());
    }
    Ok(links)
}

/// Выбирает ссылку по индексу
pub fn pick_link(links: &[String], index: usize) -> Result<String> {
    links.get(index).cloned().ok_or_else(|| {
        relay_error!(
            invalid_input,
            "ссылка #{} отсутствует, найдено ссылок: {}",
            index,
            links.len()
        )
    })
}
