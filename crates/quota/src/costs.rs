/// Quota units charged per call, by resource.
///
/// See <https://developers.google.com/youtube/v3/determine_quota_cost>.
pub const QUOTA_COSTS: &[(&str, u64)] = &[
    ("activities", 1),
    ("captions", 50),
    ("channels", 1),
    ("channelSections", 1),
    ("comments", 1),
    ("commentThreads", 1),
    ("guideCategories", 1),
    ("i18nLanguages", 1),
    ("i18nRegions", 1),
    ("members", 1),
    ("membershipsLevels", 1),
    ("playlistItems", 1),
    ("playlists", 1),
    ("search", 100),
    ("subscriptions", 1),
    ("videoAbuseReportReasons", 1),
    ("videoCategories", 1),
    ("videos", 1),
];

/// Cost of one call to `operation`, or `None` if it is not a known resource.
pub fn quota_cost(operation: &str) -> Option<u64> {
    QUOTA_COSTS
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, cost)| *cost)
}
