/// Turns a display name into the slug used as a recipe key.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `-` and strips dashes from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Station names arrive as "Hot Kitchen", "hot-kitchen" or "HOT_KITCHEN".
pub fn normalize_station(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fuzzy key for branch names coming from different upstream systems.
/// "Downtown Branch", "downtown" and "DOWNTOWN-branch" all map to `downtown`.
pub fn normalize_branch_name(name: &str) -> String {
    let key = normalize_station(name);
    match key.strip_suffix("branch") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Chicken Tikka Masala"), "chicken-tikka-masala");
        assert_eq!(slugify("  Mac & Cheese (Large) "), "mac-cheese-large");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn station_names_compare_loosely() {
        assert_eq!(normalize_station("Hot Kitchen"), "hotkitchen");
        assert_eq!(normalize_station("hot-kitchen"), normalize_station("HOT_KITCHEN"));
        assert_ne!(normalize_station("Pastry"), normalize_station("Pastry 2"));
    }

    #[test]
    fn branch_suffix_is_dropped() {
        assert_eq!(normalize_branch_name("Downtown Branch"), "downtown");
        assert_eq!(normalize_branch_name("DOWNTOWN"), "downtown");
        assert_eq!(normalize_branch_name("Branch"), "branch");
    }
}
