//! Coarse country guesses from browser locale tags.

use std::sync::LazyLock;

use regex::Regex;

/// `language[-Script][-REGION]`, with `-` or `_` separators.
static LOCALE_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?P<lang>[A-Za-z]{2,3})(?:[-_][A-Za-z]{4})?(?:[-_](?P<region>[A-Za-z]{2}))?(?:[-_.@].*)?$")
        .ok()
});

/// Most likely country per bare language subtag.
const LANGUAGE_COUNTRIES: &[(&str, &str)] = &[
    ("da", "DK"),
    ("de", "DE"),
    ("en", "US"),
    ("es", "ES"),
    ("fi", "FI"),
    ("fr", "FR"),
    ("it", "IT"),
    ("ja", "JP"),
    ("ko", "KR"),
    ("nb", "NO"),
    ("nl", "NL"),
    ("no", "NO"),
    ("pl", "PL"),
    ("pt", "PT"),
    ("ru", "RU"),
    ("sv", "SE"),
    ("zh", "CN"),
];

/// Country code implied by a locale tag.
///
/// The region subtag wins (`fr-BE` is Belgium); a bare language falls back
/// to the table above. Unknown languages and unparsable tags give `None`.
pub fn country_from_locale(locale: &str) -> Option<String> {
    let captures = LOCALE_TAG.as_ref()?.captures(locale.trim())?;
    if let Some(region) = captures.name("region") {
        return Some(region.as_str().to_ascii_uppercase());
    }
    let language = captures.name("lang")?.as_str().to_ascii_lowercase();
    LANGUAGE_COUNTRIES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, country)| country.to_string())
}
