//! Resource tags derived from request paths.
//!
//! Every cached response is registered under the tag of the resource it
//! represents. Tags nest the way the URL hierarchy does, so
//! `/v1/series/42/issues/7` becomes `series:42:issues:7`. A mutation busts
//! the resource's own tag plus the related tag of the listing or parent that
//! renders it.

use std::collections::BTreeSet;

/// Tag attached to the service root.
pub const ROOT_TAG: &str = "root";

/// A request path classified against the catalog's resource hierarchy.
///
/// Identifiers are kept as the raw path segments so that tags stay stable
/// even for ids that fail to parse as integers further down the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePath<'a> {
    Root,
    SeriesCollection,
    Series {
        series: &'a str,
    },
    SeriesIssues {
        series: &'a str,
    },
    SeriesIssue {
        series: &'a str,
        issue: &'a str,
    },
    SeriesIssueCopies {
        series: &'a str,
        issue: &'a str,
    },
    SeriesIssueCopy {
        series: &'a str,
        issue: &'a str,
        copy: &'a str,
    },
    CopyImages {
        series: &'a str,
        issue: &'a str,
        copy: &'a str,
    },
    IssueCollection,
    Issue {
        issue: &'a str,
    },
    IssueCopies {
        issue: &'a str,
    },
    IssueCopy {
        issue: &'a str,
        copy: &'a str,
    },
    JobCollection,
    Job {
        job: &'a str,
    },
    Unrecognized,
}

impl<'a> ResourcePath<'a> {
    /// Classify a raw request path.
    ///
    /// A leading `v1` segment is treated as an API version prefix when at
    /// least one segment follows it. Jobs are only addressable behind that
    /// prefix.
    pub fn parse(path: &'a str) -> Self {
        let segments: Vec<&'a str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return ResourcePath::Root;
        }

        match segments.as_slice() {
            ["v1", rest @ ..] if !rest.is_empty() => Self::parse_resource(rest, true),
            all => Self::parse_resource(all, false),
        }
    }

    fn parse_resource(segments: &[&'a str], versioned: bool) -> Self {
        match *segments {
            ["series", ref rest @ ..] => Self::parse_series(rest),
            ["issues", ref rest @ ..] => Self::parse_issues(rest),
            ["jobs"] if versioned => ResourcePath::JobCollection,
            ["jobs", job, ..] if versioned => ResourcePath::Job { job },
            _ => ResourcePath::Unrecognized,
        }
    }

    fn parse_series(rest: &[&'a str]) -> Self {
        match *rest {
            [] => ResourcePath::SeriesCollection,
            [series] => ResourcePath::Series { series },
            [series, "issues"] => ResourcePath::SeriesIssues { series },
            [series, "issues", issue] => ResourcePath::SeriesIssue { series, issue },
            [series, "issues", issue, "copies"] => {
                ResourcePath::SeriesIssueCopies { series, issue }
            }
            [series, "issues", issue, "copies", copy] => ResourcePath::SeriesIssueCopy {
                series,
                issue,
                copy,
            },
            [series, "issues", issue, "copies", copy, "images"] => ResourcePath::CopyImages {
                series,
                issue,
                copy,
            },
            _ => ResourcePath::Unrecognized,
        }
    }

    fn parse_issues(rest: &[&'a str]) -> Self {
        match *rest {
            [] => ResourcePath::IssueCollection,
            [issue] => ResourcePath::Issue { issue },
            [issue, "copies"] => ResourcePath::IssueCopies { issue },
            [issue, "copies", copy] => ResourcePath::IssueCopy { issue, copy },
            _ => ResourcePath::Unrecognized,
        }
    }

    /// Tag identifying the resource itself; `None` for unrecognised paths.
    fn own_tag(&self) -> Option<String> {
        let tag = match *self {
            ResourcePath::Root => ROOT_TAG.to_string(),
            ResourcePath::SeriesCollection => "series:list".to_string(),
            ResourcePath::Series { series } => series_tag(series),
            ResourcePath::SeriesIssues { series } => format!("{}:issues:list", series_tag(series)),
            ResourcePath::SeriesIssue { series, issue } => series_issue_tag(series, issue),
            ResourcePath::SeriesIssueCopies { series, issue } => {
                format!("{}:copies:list", series_issue_tag(series, issue))
            }
            ResourcePath::SeriesIssueCopy {
                series,
                issue,
                copy,
            } => copy_tag(&series_issue_tag(series, issue), copy),
            ResourcePath::CopyImages {
                series,
                issue,
                copy,
            } => format!("{}:images", copy_tag(&series_issue_tag(series, issue), copy)),
            ResourcePath::IssueCollection => "issues:list".to_string(),
            ResourcePath::Issue { issue } => issue_tag(issue),
            ResourcePath::IssueCopies { issue } => format!("{}:copies:list", issue_tag(issue)),
            ResourcePath::IssueCopy { issue, copy } => copy_tag(&issue_tag(issue), copy),
            ResourcePath::JobCollection => "jobs:list".to_string(),
            ResourcePath::Job { job } => format!("jobs:{job}"),
            ResourcePath::Unrecognized => return None,
        };
        Some(tag)
    }

    /// Tag of the listing or parent whose rendering includes this resource.
    fn related_tag(&self) -> Option<String> {
        let tag = match *self {
            ResourcePath::Series { .. } => "series:list".to_string(),
            ResourcePath::SeriesIssue { series, .. } => {
                format!("{}:issues:list", series_tag(series))
            }
            ResourcePath::SeriesIssueCopies { series, issue } => series_issue_tag(series, issue),
            ResourcePath::SeriesIssueCopy { series, issue, .. } => {
                format!("{}:copies:list", series_issue_tag(series, issue))
            }
            ResourcePath::CopyImages {
                series,
                issue,
                copy,
            } => copy_tag(&series_issue_tag(series, issue), copy),
            ResourcePath::Issue { .. } => "issues:list".to_string(),
            ResourcePath::IssueCopies { issue } => issue_tag(issue),
            ResourcePath::IssueCopy { issue, .. } => format!("{}:copies:list", issue_tag(issue)),
            _ => return None,
        };
        Some(tag)
    }
}

fn series_tag(series: &str) -> String {
    format!("series:{series}")
}

fn series_issue_tag(series: &str, issue: &str) -> String {
    format!("series:{series}:issues:{issue}")
}

fn issue_tag(issue: &str) -> String {
    format!("issues:{issue}")
}

fn copy_tag(parent: &str, copy: &str) -> String {
    format!("{parent}:copies:{copy}")
}

/// Tags produced for a single path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagInfo {
    /// Tags the response for this path is registered under. Never empty.
    pub cache_tags: BTreeSet<String>,
    /// Additional tags a successful mutation of this path must bust.
    pub related_tags: BTreeSet<String>,
}

impl TagInfo {
    /// Everything a mutation of this path invalidates.
    pub fn invalidation_tags(&self) -> BTreeSet<String> {
        self.cache_tags
            .union(&self.related_tags)
            .cloned()
            .collect()
    }
}

/// Derive the cache and invalidation tags for a request path.
///
/// Paths outside the known hierarchy get a single `path:` tag built from
/// their normalised segments so they can still be cached and busted.
pub fn derive_tags(path: &str) -> TagInfo {
    let resource = ResourcePath::parse(path);
    let cache_tag = resource.own_tag().unwrap_or_else(|| fallback_tag(path));

    TagInfo {
        cache_tags: BTreeSet::from([cache_tag]),
        related_tags: resource.related_tag().into_iter().collect(),
    }
}

fn fallback_tag(path: &str) -> String {
    let joined = path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("path:/{joined}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|tag| tag.to_string()).collect()
    }

    #[test]
    fn root_and_empty_paths_map_to_root_tag() {
        for path in ["", "/", "//"] {
            let info = derive_tags(path);
            assert_eq!(info.cache_tags, set(&["root"]));
            assert!(info.related_tags.is_empty());
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let path = "/v1/series/42/issues/7/copies/3/images";
        assert_eq!(derive_tags(path), derive_tags(path));
    }

    #[test]
    fn version_prefix_is_transparent() {
        assert_eq!(derive_tags("/v1/series/5"), derive_tags("/series/5"));
        assert_eq!(
            derive_tags("/v1/issues/9/copies/3"),
            derive_tags("/issues/9/copies/3")
        );
    }

    #[test]
    fn bare_version_prefix_falls_back() {
        let info = derive_tags("/v1");
        assert_eq!(info.cache_tags, set(&["path:/v1"]));
    }

    #[test]
    fn series_item_is_related_to_series_list() {
        assert_eq!(derive_tags("series").cache_tags, set(&["series:list"]));
        let info = derive_tags("/v1/series/42");
        assert_eq!(info.cache_tags, set(&["series:42"]));
        assert_eq!(info.related_tags, set(&["series:list"]));
    }

    #[test]
    fn series_hierarchy_nests_tags() {
        let issues = derive_tags("series/42/issues");
        assert_eq!(issues.cache_tags, set(&["series:42:issues:list"]));
        assert!(issues.related_tags.is_empty());

        let issue = derive_tags("series/42/issues/7");
        assert_eq!(issue.cache_tags, set(&["series:42:issues:7"]));
        assert_eq!(issue.related_tags, set(&["series:42:issues:list"]));

        let copies = derive_tags("series/42/issues/7/copies");
        assert_eq!(copies.cache_tags, set(&["series:42:issues:7:copies:list"]));
        assert_eq!(copies.related_tags, set(&["series:42:issues:7"]));

        let copy = derive_tags("series/42/issues/7/copies/3");
        assert_eq!(copy.cache_tags, set(&["series:42:issues:7:copies:3"]));
        assert_eq!(copy.related_tags, set(&["series:42:issues:7:copies:list"]));
    }

    #[test]
    fn copy_images_are_related_to_their_copy() {
        let info = derive_tags("/v1/series/42/issues/7/copies/3/images");
        assert_eq!(
            info.cache_tags,
            set(&["series:42:issues:7:copies:3:images"])
        );
        assert_eq!(info.related_tags, set(&["series:42:issues:7:copies:3"]));
    }

    #[test]
    fn flat_issue_routes_mirror_the_series_shape() {
        assert_eq!(derive_tags("/v1/issues").cache_tags, set(&["issues:list"]));

        let issue = derive_tags("/v1/issues/9");
        assert_eq!(issue.cache_tags, set(&["issues:9"]));
        assert_eq!(issue.related_tags, set(&["issues:list"]));

        let copies = derive_tags("/v1/issues/9/copies");
        assert_eq!(copies.cache_tags, set(&["issues:9:copies:list"]));
        assert_eq!(copies.related_tags, set(&["issues:9"]));

        let copy = derive_tags("/v1/issues/5/copies/1");
        assert_eq!(copy.cache_tags, set(&["issues:5:copies:1"]));
        assert_eq!(copy.related_tags, set(&["issues:5:copies:list"]));
    }

    #[test]
    fn jobs_require_version_prefix() {
        assert_eq!(derive_tags("/v1/jobs").cache_tags, set(&["jobs:list"]));
        let job = derive_tags("/v1/jobs/abc");
        assert_eq!(job.cache_tags, set(&["jobs:abc"]));
        assert!(job.related_tags.is_empty());
        assert_eq!(
            derive_tags("/v1/jobs/abc/extra").cache_tags,
            set(&["jobs:abc"])
        );
        assert_eq!(derive_tags("/jobs/abc").cache_tags, set(&["path:/jobs/abc"]));
    }

    #[test]
    fn unknown_shapes_fall_back_to_normalised_path_tag() {
        let bogus = derive_tags("series/42/bogus");
        assert_eq!(bogus.cache_tags, set(&["path:/series/42/bogus"]));
        assert!(bogus.related_tags.is_empty());

        let info = derive_tags("/v1/unknown//thing/");
        assert_eq!(info.cache_tags, set(&["path:/v1/unknown/thing"]));

        let trailing = derive_tags("/v1/issues/9/copies/3/images");
        assert_eq!(
            trailing.cache_tags,
            set(&["path:/v1/issues/9/copies/3/images"])
        );
    }

    #[test]
    fn invalidation_tags_are_the_union() {
        let info = derive_tags("/v1/series/42");
        assert_eq!(info.invalidation_tags(), set(&["series:42", "series:list"]));
    }
}
