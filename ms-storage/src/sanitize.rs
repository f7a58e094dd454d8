//! The ingress sanitizer: the boundary between "whatever a client sent" and
//! the sanitized-point invariant the rest of the system trusts (see the
//! invariant note on `ms_net::Point`). Runs once per point, at the edge.

use ms_net::Point;

/// Replace any byte outside `[A-Za-z0-9_:]` with `_`. Metric names may
/// additionally start with a digit after rewriting -- Prometheus forbids that,
/// but this sanitizer is deliberately permissive here, matching the ingress
/// path's "best effort, never reject" stance.
fn rewrite(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect()
}

/// Sanitize one point in place. Returns `false` if the point should be
/// dropped outright (non-finite value), `true` if it was kept (and possibly
/// rewritten).
pub fn sanitize(point: &mut Point) -> bool {
    if !point.value.is_finite() {
        return false;
    }
    point.name = rewrite(&point.name);
    let rewritten: Vec<(String, String)> = std::mem::take(&mut point.labels)
        .into_iter()
        .map(|(k, v)| (rewrite(&k), v))
        .collect();
    for (k, v) in rewritten {
        point.labels.insert(k, v);
    }
    point.labels.insert("__name__".to_string(), point.name.clone());
    true
}

/// Sanitize a batch in place, dropping non-finite points. Returns the number
/// dropped, so callers can account for it in metrics.
pub fn sanitize_batch(points: &mut Vec<Point>) -> usize {
    let before = points.len();
    points.retain_mut(sanitize);
    before - points.len()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn drops_non_finite_values() {
        let mut p = Point::new("m", 0, f64::NAN);
        assert!(!sanitize(&mut p));
    }

    #[test]
    fn rewrites_invalid_characters_and_sets_dunder_name() {
        let mut p = Point::new("http.requests-total", 0, 1.0).with_label("path.name", "/a/b");
        assert!(sanitize(&mut p));
        assert_eq!(p.name, "http_requests_total");
        assert_eq!(p.labels.get("path_name").map(String::as_str), Some("/a/b"));
        assert_eq!(p.labels.get("__name__").map(String::as_str), Some("http_requests_total"));
    }

    #[test]
    fn batch_sanitize_counts_dropped() {
        let mut points = vec![
            Point::new("ok", 0, 1.0),
            Point::new("bad", 0, f64::INFINITY),
        ];
        let dropped = sanitize_batch(&mut points);
        assert_eq!(dropped, 1);
        assert_eq!(points.len(), 1);
    }
}
