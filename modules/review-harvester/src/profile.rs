//! Site profile: every selector the harvester uses, as data.
//!
//! Adding a new page-structure variant means appending a strategy to the
//! relevant chain, not touching the resolver or extractor.

use harvest_common::{HarvestConfig, ItemIdentity, SubjectQuery};

use crate::locator::LocatorChain;
use crate::traits::{Selector, Strategy};

const MAPS_SEARCH_BASE: &str = "https://www.google.com/maps/search/";

const SCROLL_TO_END_SCRIPT: &str = "arguments[0].scrollTop = arguments[0].scrollHeight";

const SYNDICATION_SOURCES: &[&str] = &["Tripadvisor", "Yelp", "Facebook", "Booking"];

#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub search_base: String,

    // --- Document-level chains ---
    pub consent: LocatorChain,
    pub subject_name: LocatorChain,
    pub average_score: LocatorChain,
    pub total_count: LocatorChain,
    pub reviews_tab: LocatorChain,
    pub sort_control: LocatorChain,
    pub sort_lowest: LocatorChain,
    pub scroll_container: LocatorChain,

    // --- Items ---
    pub item: Selector,
    pub identity_attribute: String,
    pub scroll_script: String,

    // --- Per-item fields (looked up inside the item, no waiting) ---
    pub score_label: Selector,
    pub score_label_attribute: String,
    pub score_fraction: Selector,
    pub score_scan: Selector,
    pub author: Selector,
    pub date_direct: Selector,
    pub date_combined: Selector,
    pub date_legacy: Selector,
    pub expand: Selector,
    pub body: Selector,

    // --- Source attribution ---
    pub first_party: String,
    pub syndication_sources: Vec<String>,
}

impl SiteProfile {
    /// Map-service place pages, English and German UI.
    pub fn maps(config: &HarvestConfig) -> Self {
        let t = config.locator_timeout;
        // Slower-loading regions get a little extra.
        let t_slow = t + t / 3;

        Self {
            search_base: MAPS_SEARCH_BASE.to_string(),

            consent: LocatorChain::new(
                "cookie consent",
                vec![Strategy::clickable(
                    Selector::xpath(
                        r#"//button[.//span[contains(text(),"Accept all") or contains(text(),"Alle akzeptieren")]]"#,
                    ),
                    t,
                )],
            ),
            subject_name: LocatorChain::new(
                "subject name",
                vec![Strategy::present(Selector::css("h1.DUwDvf"), t)],
            ),
            average_score: LocatorChain::new(
                "average score",
                vec![Strategy::present(
                    Selector::xpath(
                        r#"//*[@id="QA0Szd"]/div/div/div[1]/div[2]/div/div[1]/div/div/div[2]/div/div[1]/div[2]/div/div[1]/div[2]/span[1]/span[1]"#,
                    ),
                    t,
                )],
            ),
            total_count: LocatorChain::new(
                "total count",
                vec![Strategy::present(
                    Selector::xpath(
                        r#"//*[@id="QA0Szd"]/div/div/div[1]/div[2]/div/div[1]/div/div/div[2]/div/div[1]/div[2]/div/div[1]/div[2]/span[2]/span/span"#,
                    ),
                    t_slow,
                )],
            ),
            reviews_tab: LocatorChain::new(
                "reviews tab",
                vec![
                    Strategy::clickable(
                        Selector::xpath(
                            r#"//button[contains(@aria-label, "Reviews for") or contains(@aria-label, "Rezensionen für")]"#,
                        ),
                        t,
                    ),
                    Strategy::clickable(
                        Selector::xpath(
                            r#"//button[@role="tab"][contains(., "Reviews") or contains(., "Rezensionen")]"#,
                        ),
                        t,
                    ),
                    Strategy::clickable(
                        Selector::xpath(
                            r#"//div[contains(@class, "Gpq6kf") and contains(@class, "NlVald") and (text()="Reviews" or text()="Rezensionen")]"#,
                        ),
                        t,
                    ),
                ],
            ),
            sort_control: LocatorChain::new(
                "sort control",
                [
                    r#"//span[@class="Cw1rxd google-symbols G47vBd"]"#,
                    r#"//button[@class="HQzyZ"][@aria-label="Most relevant"]"#,
                    r#"//button[contains(@aria-label, "Most relevant")]"#,
                    r#"//div[@class="fontBodyLarge k5lwKb" and text()="Most relevant"]"#,
                    r#"//span[@class="GMtm7c fontTitleSmall" and text()="Sort"]"#,
                    r#"//*[@id="QA0Szd"]/div/div/div[1]/div[2]/div/div[1]/div/div/div[4]/div[10]/button[2]/div"#,
                ]
                .iter()
                .map(|x| Strategy::clickable(Selector::xpath(x), t))
                .collect(),
            ),
            sort_lowest: LocatorChain::new(
                "lowest-rating sort option",
                vec![Strategy::clickable(
                    Selector::xpath(r#"//*[@id="action-menu"]/div[4]"#),
                    t_slow,
                )],
            ),
            scroll_container: LocatorChain::new(
                "review scroll container",
                vec![
                    Strategy::present(
                        Selector::xpath(
                            r#"//div[@role="main"]/div[contains(@class, "review-dialog-list")]"#,
                        ),
                        t_slow,
                    ),
                    Strategy::present(
                        Selector::xpath(
                            r#"//div[contains(@aria-label, "Reviews for") or contains(@aria-label, "Rezensionen für")]/following-sibling::div//div[contains(@class, "DxyBCb")]"#,
                        ),
                        t_slow,
                    ),
                    Strategy::present(
                        Selector::xpath(r#"//div[contains(@class, "DxyBCb")]"#),
                        t_slow,
                    ),
                ],
            ),

            item: Selector::xpath("//div[@data-review-id]"),
            identity_attribute: "data-review-id".to_string(),
            scroll_script: SCROLL_TO_END_SCRIPT.to_string(),

            score_label: Selector::xpath(
                r#".//span[contains(@aria-label, "star") or contains(@aria-label, "Stern")]"#,
            ),
            score_label_attribute: "aria-label".to_string(),
            score_fraction: Selector::xpath(r#".//span[@class="fzvQIb"]"#),
            score_scan: Selector::xpath(r#".//span[contains(text(), "/5")]"#),
            author: Selector::xpath(".//div[contains(@class, 'd4r55')]"),
            date_direct: Selector::xpath(".//span[contains(@class, 'rsqaWe')]"),
            date_combined: Selector::xpath(".//div[@class='DU9Pgb']"),
            date_legacy: Selector::xpath(".//span[@class='xRkPPb']"),
            expand: Selector::xpath(
                ".//button[contains(@aria-label, 'See more') or contains(@aria-label, 'Mehr')]",
            ),
            body: Selector::xpath(".//span[contains(@class, 'wiI7pd')]"),

            first_party: "Google".to_string(),
            syndication_sources: SYNDICATION_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Search address for a subject; spaces become `+`.
    pub fn search_address(&self, query: &SubjectQuery) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(query.search_terms().as_bytes()).collect();
        format!("{}{}", self.search_base, encoded)
    }

    /// Deterministic link to one review, built from the page address.
    pub fn permalink(&self, current_address: &str, identity: &ItemIdentity) -> String {
        let base = current_address.split('?').next().unwrap_or(current_address);
        format!("{base}?hl=en&review={identity}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_address_plus_encodes_terms() {
        let profile = SiteProfile::maps(&HarvestConfig::default());
        let q = SubjectQuery::new("Cafe Lumen", Some("Berlin Mitte".to_string()));
        assert_eq!(
            profile.search_address(&q),
            "https://www.google.com/maps/search/Cafe+Lumen+Berlin+Mitte"
        );
    }

    #[test]
    fn search_address_escapes_reserved_characters() {
        let profile = SiteProfile::maps(&HarvestConfig::default());
        let q = SubjectQuery::new("Fish & Chips", None);
        assert_eq!(
            profile.search_address(&q),
            "https://www.google.com/maps/search/Fish+%26+Chips"
        );
    }

    #[test]
    fn permalink_drops_query_string() {
        let profile = SiteProfile::maps(&HarvestConfig::default());
        let id = ItemIdentity::parse("ChZDSUhN").unwrap();
        assert_eq!(
            profile.permalink("https://maps.example/place/x?entry=ttu&g_ep=1", &id),
            "https://maps.example/place/x?hl=en&review=ChZDSUhN"
        );
    }

    #[test]
    fn required_chains_have_fallbacks() {
        let profile = SiteProfile::maps(&HarvestConfig::default());
        assert_eq!(profile.reviews_tab.strategies.len(), 3);
        assert_eq!(profile.scroll_container.strategies.len(), 3);
        assert_eq!(profile.sort_control.strategies.len(), 6);
    }
}
