//! End-to-end harvest behavior against the scripted mock document.
//!
//! Every test runs the real Harvester with zero settle delays; the mock
//! records clicks, scrolls and session closes for the assertions.

use std::collections::HashSet;
use std::sync::Arc;

use harvest_common::{HarvestConfig, ScoreSet, SubjectQuery, DATE_NOT_FOUND, UNKNOWN};
use review_harvester::pagination::PaginationStop;
use review_harvester::run_log::{HarvestEvent, RunLog};
use review_harvester::testing::{MockPage, MockReview, MockSurface};
use review_harvester::{HarvestReport, Harvester};

struct Run {
    surface: Arc<MockSurface>,
    log: Arc<RunLog>,
    report: HarvestReport,
}

async fn harvest(config: HarvestConfig, page: MockPage, wanted: &[u8]) -> Run {
    let surface = Arc::new(MockSurface::new(&config, page));
    let log = Arc::new(RunLog::new());
    let harvester = Harvester::new(surface.clone(), config, log.clone());
    let report = harvester
        .harvest(
            &SubjectQuery::new("Cafe Lumen", None),
            &ScoreSet::from_values(wanted).unwrap(),
        )
        .await;
    Run {
        surface,
        log,
        report,
    }
}

fn ids(report: &HarvestReport) -> Vec<&str> {
    report.records.iter().map(|r| r.identity.as_str()).collect()
}

fn stars(prefix: &str, scores: &[u8]) -> Vec<MockReview> {
    scores
        .iter()
        .enumerate()
        .map(|(i, &s)| MockReview::stars(&format!("{prefix}{i}"), s))
        .collect()
}

// ---------------------------------------------------------------------------
// Output invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn records_only_carry_wanted_first_party_scores() {
    let mut reviews = Vec::new();
    let mut syndicated = HashSet::new();
    for i in 0..25u8 {
        let score = i % 5 + 1;
        let id = format!("r{i}");
        let review = if i % 4 == 0 {
            syndicated.insert(id.clone());
            MockReview::stars(&id, score).combined_date(&format!("{score}/5 a year ago on Yelp"))
        } else {
            MockReview::stars(&id, score).direct_date("2 months ago")
        };
        reviews.push(review);
    }

    for wanted in [&[1][..], &[2, 3], &[4, 5], &[1, 2, 3, 4, 5]] {
        let run = harvest(
            HarvestConfig::immediate(),
            MockPage::with_reviews(reviews.clone()),
            wanted,
        )
        .await;
        assert!(run.report.diagnostic.is_none());
        assert!(!run.report.records.is_empty(), "wanted {wanted:?} found nothing");
        for record in &run.report.records {
            assert!(
                wanted.contains(&record.score.value()),
                "score {} not in {wanted:?}",
                record.score
            );
            assert!(
                !syndicated.contains(record.identity.as_str()),
                "syndicated review {} leaked",
                record.identity
            );
        }
        assert_eq!(run.report.count, run.report.records.len());
    }
}

#[tokio::test]
async fn identity_seen_in_two_snapshots_yields_one_record() {
    let mut reviews = stars("r", &[1; 14]);
    // Same identity re-rendered in the first batch and again after a scroll.
    reviews[2] = MockReview::stars("repeat", 1);
    reviews[12] = MockReview::stars("repeat", 1);
    reviews.push(MockReview::stars("repeat", 1));

    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            initial: 10,
            batch: 5,
            ..MockPage::with_reviews(reviews)
        },
        &[1],
    )
    .await;

    let repeats = ids(&run.report).iter().filter(|id| **id == "repeat").count();
    assert_eq!(repeats, 1);
    assert_eq!(run.report.stats.duplicates, 2);
    assert_eq!(run.report.count, 13);
}

// ---------------------------------------------------------------------------
// Early stop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trailing_window_above_wanted_stops_growth_before_the_cap() {
    let mut scores = vec![1u8; 10];
    scores.extend([4u8; 40]);
    // Shuffled so only the sort puts the low scores first.
    let mut reviews = stars("r", &scores);
    reviews.reverse();

    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            initial: 10,
            batch: 5,
            ..MockPage::with_reviews(reviews)
        },
        &[1, 2],
    )
    .await;

    let pagination = run.report.pagination.as_ref().unwrap();
    assert_eq!(pagination.stop, PaginationStop::EarlyStop);
    assert_eq!(pagination.cycles, 2);
    assert_eq!(pagination.final_count, 15);
    assert_eq!(run.surface.scrolls(), 1);
    assert!(run.report.stats.sort_active);
    assert!(run.report.stats.early_stop_pagination);

    assert_eq!(run.report.count, 10);
    assert!(run.report.records.iter().all(|r| r.score.value() == 1));
}

#[tokio::test]
async fn five_consecutive_high_scores_halt_extraction() {
    // The sort "succeeds" but the listing keeps its order.
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            sort_reorders: false,
            ..MockPage::with_reviews(stars("r", &[1, 4, 5, 4, 5, 4, 2]))
        },
        &[1, 2],
    )
    .await;

    assert!(run.report.stats.sort_active);
    assert_eq!(ids(&run.report), vec!["r0"]);
    assert_eq!(run.report.stats.above_threshold, 5);
    assert!(run.report.stats.early_stop_extraction);
    assert!(run.log.kinds().contains(&HarvestEvent::ExtractionStopped {
        after_items: 6,
        consecutive_above: 5,
    }));
}

#[tokio::test]
async fn missing_sort_control_disables_early_stop() {
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            has_sort_control: false,
            ..MockPage::with_reviews(stars("r", &[1, 4, 4, 4, 4, 4, 4, 2]))
        },
        &[1, 2],
    )
    .await;

    assert!(!run.report.stats.sort_active);
    assert!(!run.report.stats.early_stop_extraction);
    assert_eq!(run.report.stats.unwanted_score, 6);
    assert_eq!(ids(&run.report), vec!["r0", "r7"]);
    assert!(run.log.kinds().contains(&HarvestEvent::SortUnavailable {
        step: "sort control".to_string(),
    }));

    // Unsorted patience: one growing cycle plus five unchanged ones.
    let pagination = run.report.pagination.as_ref().unwrap();
    assert_eq!(pagination.stop, PaginationStop::Exhausted);
    assert_eq!(pagination.cycles, 6);
}

#[tokio::test]
async fn missing_sort_option_also_disables_early_stop() {
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            has_sort_option: false,
            ..MockPage::with_reviews(stars("r", &[1, 4, 4, 4, 4, 4, 2]))
        },
        &[1, 2],
    )
    .await;

    assert!(!run.report.stats.sort_active);
    assert!(!run.surface.sorted());
    assert_eq!(ids(&run.report), vec!["r0", "r6"]);
    assert!(run.log.kinds().contains(&HarvestEvent::SortUnavailable {
        step: "lowest-rating sort option".to_string(),
    }));
}

#[tokio::test]
async fn disabled_optimization_never_sorts() {
    let config = HarvestConfig {
        sort_optimization: false,
        ..HarvestConfig::immediate()
    };
    let run = harvest(
        config,
        MockPage {
            sort_reorders: false,
            ..MockPage::with_reviews(stars("r", &[1, 4, 4, 4, 4, 4, 2]))
        },
        &[1, 2],
    )
    .await;

    assert!(!run.surface.sorted());
    assert!(!run.surface.clicks().iter().any(|c| c == "sort_control"));
    assert_eq!(ids(&run.report), vec!["r0", "r6"]);
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stable_count_exhausts_the_listing() {
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            initial: 5,
            batch: 4,
            ..MockPage::with_reviews(stars("r", &[5; 12]))
        },
        &[4, 5],
    )
    .await;

    let pagination = run.report.pagination.as_ref().unwrap();
    assert_eq!(pagination.stop, PaginationStop::Exhausted);
    // 5, 9, 12 then five cycles at 12.
    assert_eq!(pagination.cycles, 8);
    assert_eq!(pagination.final_count, 12);
    assert_eq!(run.report.count, 12);

    let counts: Vec<usize> = run
        .log
        .kinds()
        .into_iter()
        .filter_map(|k| match k {
            HarvestEvent::GrowthCycle { item_count, .. } => Some(item_count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![5, 9, 12, 12, 12, 12, 12, 12]);
}

#[tokio::test]
async fn enumeration_failure_during_growth_keeps_loaded_items() {
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            initial: 10,
            batch: 5,
            failing_enumerations: vec![2],
            ..MockPage::with_reviews(stars("r", &[1; 12]))
        },
        &[1],
    )
    .await;

    assert!(run.report.diagnostic.is_none());
    let pagination = run.report.pagination.as_ref().unwrap();
    assert_eq!(pagination.stop, PaginationStop::Interrupted);
    assert_eq!(pagination.cycles, 1);
    assert_eq!(pagination.final_count, 10);
    // The scroll after the first cycle already loaded the rest.
    assert_eq!(run.report.count, 12);
    assert_eq!(run.surface.closed_count(), 1);
}

#[tokio::test]
async fn failed_final_enumeration_yields_empty_result_without_diagnostic() {
    let config = HarvestConfig {
        patience: 1,
        patience_sorted: 1,
        ..HarvestConfig::immediate()
    };
    // Two growth enumerations (3 then 3 again), then the extraction pass.
    let run = harvest(
        config,
        MockPage {
            failing_enumerations: vec![3],
            ..MockPage::with_reviews(stars("r", &[1, 1, 1]))
        },
        &[1],
    )
    .await;

    assert!(run.report.diagnostic.is_none());
    assert!(run.report.records.is_empty());
    assert_eq!(run.report.stats.items_enumerated, 0);
    let pagination = run.report.pagination.as_ref().unwrap();
    assert_eq!(pagination.stop, PaginationStop::Exhausted);
    assert_eq!(pagination.final_count, 3);
    assert_eq!(run.surface.closed_count(), 1);
}

// ---------------------------------------------------------------------------
// Fatal navigation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_reviews_tab_aborts_and_releases() {
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            has_reviews_tab: false,
            ..MockPage::with_reviews(stars("r", &[1, 1]))
        },
        &[1],
    )
    .await;

    assert!(run.report.records.is_empty());
    assert_eq!(run.report.count, 0);
    let diagnostic = run.report.diagnostic.as_deref().unwrap();
    assert!(diagnostic.contains("reviews tab"), "{diagnostic}");
    assert_eq!(run.surface.closed_count(), 1);
    assert!(run.log.kinds().contains(&HarvestEvent::NavigationFailed {
        element: "reviews tab".to_string(),
    }));
    assert!(run
        .log
        .kinds()
        .contains(&HarvestEvent::SessionReleased { clean: true }));
}

#[tokio::test]
async fn missing_scroll_container_aborts_and_releases() {
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage {
            has_scroll_container: false,
            ..MockPage::with_reviews(stars("r", &[1, 1]))
        },
        &[1],
    )
    .await;

    assert!(run.report.records.is_empty());
    assert!(run.report.pagination.is_none());
    assert!(run
        .report
        .diagnostic
        .as_deref()
        .is_some_and(|d| d.contains("review scroll container")));
    assert_eq!(run.surface.closed_count(), 1);
}

// ---------------------------------------------------------------------------
// Dates and sources
// ---------------------------------------------------------------------------

#[tokio::test]
async fn combined_date_texts_resolve_date_and_source() {
    let reviews = vec![
        MockReview::fraction("syndicated", "2/5").combined_date("2/5 5 years ago on Tripadvisor"),
        MockReview::stars("relative", 2).combined_date("a year ago"),
        MockReview::stars("garbled", 2).combined_date("posted sometime"),
        MockReview::stars("first-party", 2).combined_date("3 weeks ago on Google"),
    ];
    let run = harvest(
        HarvestConfig::immediate(),
        MockPage::with_reviews(reviews),
        &[2],
    )
    .await;

    assert_eq!(ids(&run.report), vec!["relative", "garbled", "first-party"]);
    assert_eq!(run.report.stats.syndicated, 1);
    let posted: Vec<&str> = run.report.records.iter().map(|r| r.posted_at.as_str()).collect();
    assert_eq!(posted, vec!["a year ago", DATE_NOT_FOUND, "3 weeks ago"]);
    assert!(run.log.kinds().contains(&HarvestEvent::ItemSkipped {
        identity: "syndicated".to_string(),
        reason: "non-primary-source(Tripadvisor)".to_string(),
    }));
}

#[tokio::test]
async fn basic_date_mode_reads_only_direct_dates() {
    let config = HarvestConfig {
        advanced_date_parsing: false,
        ..HarvestConfig::immediate()
    };
    let reviews = vec![
        MockReview::stars("direct", 1).direct_date("2 days ago"),
        MockReview::stars("combined", 1).combined_date("1/5 5 years ago on Tripadvisor"),
    ];
    let run = harvest(config, MockPage::with_reviews(reviews), &[1]).await;

    assert_eq!(ids(&run.report), vec!["direct", "combined"]);
    assert_eq!(run.report.records[0].posted_at, "2 days ago");
    assert_eq!(run.report.records[1].posted_at, UNKNOWN);
    assert_eq!(run.report.stats.syndicated, 0);
}

#[tokio::test]
async fn malformed_items_are_counted_and_skipped() {
    let reviews = vec![
        MockReview::stars("a", 1).without_identity(),
        MockReview::unscored("b"),
        MockReview::stars("c", 1).author("Ana").body("Soup was cold."),
    ];
    let run = harvest(HarvestConfig::immediate(), MockPage::with_reviews(reviews), &[1]).await;

    assert_eq!(ids(&run.report), vec!["c"]);
    assert_eq!(run.report.stats.no_identity, 1);
    assert_eq!(run.report.stats.no_score, 1);
    let record = &run.report.records[0];
    assert_eq!(record.author, "Ana");
    assert_eq!(record.body, "Soup was cold.");
    assert_eq!(record.subject.name, "Cafe Lumen");
    assert_eq!(
        record.permalink,
        "https://maps.example/place/cafe?hl=en&review=c"
    );
}
