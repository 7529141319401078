//! Place text cleanup, cache keys and provider query variants.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::types::geo::QueryKey;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref PARENS: Regex = Regex::new(r"\(([^)]+)\)").unwrap();
    static ref DIRECTION: Regex = Regex::new(
        r"(?i)\b(?:al|a la|a los|a las|towards|north of|south of|east of|west of|noreste de|noroeste de|norte de|sur de|este de|oeste de|noreste|noroeste|sureste|suroeste)\b"
    )
    .unwrap();
    static ref NEAR: Regex = Regex::new(
        r"(?i)\b(?:cerca de|en las cercan[ií]as de|en las proximidades de|pr[oó]ximo a|alrededor de|near|around|adjacent to|junto a|junto al|junto a la)\b"
    )
    .unwrap();
    static ref TRAILING_QUALIFIER: Regex = Regex::new(
        r"(?i)\b(?:city|ciudad|province|provincia|state|estado|region|región|district|distrito|governorate)\b\.?$"
    )
    .unwrap();
}

/// Map a country hint to its canonical name.
///
/// Known aliases (Spanish names, territories) are rewritten; anything else
/// is returned trimmed.
pub fn canonical_country(country: Option<&str>) -> Option<String> {
    let country = country.map(str::trim).filter(|c| !c.is_empty())?;
    let canonical = match country.to_lowercase().as_str() {
        "libia" | "libya" => "Libya",
        "haiti" | "haití" => "Haiti",
        "colombia" => "Colombia",
        "españa" | "spain" | "campello" => "Spain",
        "gaza" | "gaza strip" => "Gaza Strip",
        "palestine" | "palestina" | "state of palestine" => "State of Palestine",
        "liberia" => "Liberia",
        _ => return Some(country.to_string()),
    };
    Some(canonical.to_string())
}

/// Strip bullets, direction/proximity qualifiers and trailing admin words.
pub fn sanitize_place(place: &str) -> String {
    let cleaned = place
        .trim()
        .trim_matches(|c| matches!(c, ',' | '.' | ';'))
        .replace(['#', '•', '●'], " ");
    let cleaned = DIRECTION.replace_all(&cleaned, "");
    let cleaned = NEAR.replace_all(&cleaned, "");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    let cleaned = trim_separators(&cleaned);
    let cleaned = TRAILING_QUALIFIER.replace(cleaned, "");
    trim_separators(&cleaned).to_string()
}

fn trim_separators(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-'))
}

/// Cache key for a place and country hint: `"{place}||{country}"`, casefolded.
pub fn query_key(place: &str, country: Option<&str>) -> QueryKey {
    let place = sanitize_place(place).to_lowercase();
    let country = canonical_country(country)
        .map(|c| WHITESPACE.replace_all(&c, " ").to_lowercase())
        .unwrap_or_default();
    QueryKey::from_raw(format!("{place}||{country}"))
}

fn alternative_tokens(place: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for cap in PARENS.captures_iter(place) {
        let chunk = sanitize_place(&cap[1]);
        if !chunk.is_empty() {
            tokens.push(chunk);
        }
    }

    if let Some((head, tail)) = place.split_once(',') {
        let head = sanitize_place(head);
        let tail = sanitize_place(tail);
        if !head.is_empty() {
            tokens.push(head.clone());
        }
        if !tail.is_empty() && tail != head {
            tokens.push(tail);
        }
    }

    if place.contains('/') {
        tokens.extend(
            place
                .split('/')
                .map(sanitize_place)
                .filter(|piece| !piece.is_empty()),
        );
    }

    tokens
}

/// Ordered, case-insensitively unique provider queries for a place.
///
/// Falls back to the country alone when the place yields nothing usable.
pub fn build_queries(place: &str, country: Option<&str>) -> Vec<String> {
    let mut queries = Vec::new();
    let mut seen = HashSet::new();
    let mut add = |candidate: String| {
        let candidate = candidate.trim_matches(|c| c == ',' || c == ' ').to_string();
        if !candidate.is_empty() && seen.insert(candidate.to_lowercase()) {
            queries.push(candidate);
        }
    };

    let base = sanitize_place(place);
    if !base.is_empty() {
        if let Some(country) = country {
            add(base.clone());
            add(format!("{base}, {country}"));
        } else {
            add(base);
        }
    }

    for extra in alternative_tokens(place) {
        if let Some(country) = country {
            add(extra.clone());
            add(format!("{extra}, {country}"));
        } else {
            add(extra);
        }
    }

    drop(add);
    if queries.is_empty() {
        if let Some(country) = country.map(str::trim).filter(|c| !c.is_empty()) {
            queries.push(country.to_string());
        }
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_country() {
        assert_eq!(canonical_country(Some(" libia ")).as_deref(), Some("Libya"));
        assert_eq!(canonical_country(Some("Haití")).as_deref(), Some("Haiti"));
        assert_eq!(
            canonical_country(Some("palestina")).as_deref(),
            Some("State of Palestine")
        );
        assert_eq!(canonical_country(Some("Sudan")).as_deref(), Some("Sudan"));
        assert_eq!(canonical_country(Some("  ")), None);
        assert_eq!(canonical_country(None), None);
    }

    #[test]
    fn test_sanitize_place() {
        assert_eq!(sanitize_place("near Zawiya"), "Zawiya");
        assert_eq!(sanitize_place("north of Sirte city"), "Sirte");
        assert_eq!(sanitize_place("  #Tripoli, "), "Tripoli");
        assert_eq!(sanitize_place("cerca de  Cap-Haïtien"), "Cap-Haïtien");
        assert_eq!(sanitize_place("Benghazi Province."), "Benghazi");
    }

    #[test]
    fn test_query_key_normalizes() {
        assert_eq!(
            query_key("  Tripoli   Old  Town ", Some("libia")).as_str(),
            "tripoli old town||libya"
        );
        assert_eq!(
            query_key("TRIPOLI OLD TOWN", Some("Libya")),
            query_key("tripoli old town", Some(" LIBYA "))
        );
        assert_eq!(query_key("Tripoli", None).as_str(), "tripoli||");
    }

    #[test]
    fn test_build_queries_variants() {
        let queries = build_queries("Abu Salim (Tripoli), Libya", Some("Libya"));
        assert_eq!(queries[0], "Abu Salim (Tripoli), Libya");
        assert!(queries.contains(&"Tripoli".to_string()));
        assert!(queries.contains(&"Tripoli, Libya".to_string()));
        assert!(queries.contains(&"Abu Salim (Tripoli)".to_string()));

        let lower: HashSet<_> = queries.iter().map(|q| q.to_lowercase()).collect();
        assert_eq!(lower.len(), queries.len());
    }

    #[test]
    fn test_build_queries_slash_pieces() {
        let queries = build_queries("Jacmel/Léogâne", None);
        assert_eq!(queries, vec!["Jacmel/Léogâne", "Jacmel", "Léogâne"]);
    }

    #[test]
    fn test_build_queries_country_fallback() {
        assert_eq!(build_queries("north of", Some("Libya")), vec!["Libya"]);
        assert!(build_queries("  ", None).is_empty());
    }
}
