//! Enumerates the reports attached to a dashboard
//!
//! Order is exactly the order the service listed them in, so repeated runs
//! issue identical call sequences.

use crate::resource::Dashboard;

/// Iterator over a dashboard's report ids
pub struct ReportWalk<'a> {
    ids: std::slice::Iter<'a, String>,
}

impl<'a> Iterator for ReportWalk<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.next().map(String::as_str)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for ReportWalk<'_> {}

/// Reports of `dashboard` in server order
///
/// An empty walk is not an error; callers treat it as nothing to do.
pub fn reports_of(dashboard: &Dashboard) -> ReportWalk<'_> {
    ReportWalk {
        ids: dashboard.report_ids.iter(),
    }
}

/// "1 report", "3 reports"
pub fn describe_count(count: usize) -> String {
    format!("{} report{}", count, if count == 1 { "" } else { "s" })
}
