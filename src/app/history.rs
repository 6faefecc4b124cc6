use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history offset {offset} from position {cursor} is outside 0..{len}")]
    OutOfRange {
        cursor: usize,
        offset: isize,
        len: usize,
    },
}

/// One visited location, as recorded for back/forward navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryEntry {
    pub locator: Option<Url>,
    /// What the location bar showed, which may differ from `locator`.
    pub display_locator: String,
    pub title: String,
    pub service_type: String,
    pub service_name: String,
    /// Handler-defined state (scroll offsets and the like). `None` until
    /// the entry is first updated by a handler that can capture state.
    pub state: Option<Vec<u8>>,
}

/// Ordered list of visited locations with a cursor on the displayed one.
#[derive(Debug, Default)]
pub struct HistoryList {
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
}

impl HistoryList {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
        }
    }

    /// Drop any forward history and append a blank entry, which becomes current.
    pub fn create_entry(&mut self) -> &mut HistoryEntry {
        if let Some(index) = self.cursor {
            self.entries.truncate(index + 1);
        }

        self.entries.push(HistoryEntry::default());
        let index = self.entries.len() - 1;
        self.cursor = Some(index);
        &mut self.entries[index]
    }

    /// Overwrite the current entry in place.
    pub fn update_current(&mut self, entry: HistoryEntry) {
        let index = match self.cursor {
            Some(index) => index,
            None => {
                log::warn!("Creating item because history is empty");
                self.create_entry();
                self.entries.len() - 1
            }
        };

        log::debug!(
            "Saving {:?} ({}) in history position {}",
            entry.locator.as_ref().map(Url::as_str),
            entry.title,
            index
        );
        self.entries[index] = entry;
    }

    /// Index `offset` steps from the cursor, if it is inside the list.
    pub fn target(&self, offset: isize) -> Result<usize, HistoryError> {
        let cursor = self.cursor.unwrap_or(0);
        cursor
            .checked_add_signed(offset)
            .filter(|&target| target < self.entries.len())
            .ok_or(HistoryError::OutOfRange {
                cursor,
                offset,
                len: self.entries.len(),
            })
    }

    pub fn move_to(&mut self, offset: isize) -> Result<&HistoryEntry, HistoryError> {
        let target = self.target(offset)?;
        self.cursor = Some(target);
        Ok(&self.entries[target])
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.cursor.map(|i| &self.entries[i])
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of entries behind the cursor.
    pub fn back_count(&self) -> usize {
        self.cursor.unwrap_or(0)
    }

    /// Number of entries ahead of the cursor.
    pub fn forward_count(&self) -> usize {
        self.cursor
            .map(|i| self.entries.len() - i - 1)
            .unwrap_or(0)
    }

    pub fn can_go_back(&self) -> bool {
        self.back_count() > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.forward_count() > 0
    }

    /// Whether `offset` can be passed to [`HistoryList::move_to`].
    pub fn can_move(&self, offset: isize) -> bool {
        self.target(offset).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> HistoryEntry {
        HistoryEntry {
            locator: Some(Url::parse(url).unwrap()),
            display_locator: url.to_string(),
            title: url.to_string(),
            service_type: "text/html".to_string(),
            service_name: "page".to_string(),
            state: None,
        }
    }

    fn visit(history: &mut HistoryList, url: &str) {
        history.create_entry();
        history.update_current(entry(url));
    }

    fn locators(history: &HistoryList) -> Vec<&str> {
        history
            .entries()
            .iter()
            .map(|e| e.locator.as_ref().map(Url::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_history_navigation() {
        let mut history = HistoryList::new();

        visit(&mut history, "https://example.com/");
        visit(&mut history, "https://example.com/page1");
        visit(&mut history, "https://example.com/page2");

        assert_eq!(history.cursor(), Some(2));
        assert!(history.can_go_back());
        assert!(!history.can_go_forward());

        let entry = history.move_to(-1).unwrap();
        assert_eq!(entry.display_locator, "https://example.com/page1");

        history.move_to(-1).unwrap();
        assert_eq!(history.cursor(), Some(0));
        assert!(!history.can_go_back());
        assert!(history.can_go_forward());
        assert_eq!(history.forward_count(), 2);

        history.move_to(2).unwrap();
        assert_eq!(history.cursor(), Some(2));
    }

    #[test]
    fn test_create_entry_truncates_forward_history() {
        let mut history = HistoryList::new();
        visit(&mut history, "https://a.com/");
        visit(&mut history, "https://b.com/");
        visit(&mut history, "https://c.com/");

        history.move_to(-2).unwrap();
        visit(&mut history, "https://d.com/");

        assert_eq!(locators(&history), vec!["https://a.com/", "https://d.com/"]);
        assert_eq!(history.cursor(), Some(1));
    }

    #[test]
    fn test_create_entry_is_blank() {
        let mut history = HistoryList::new();
        visit(&mut history, "https://a.com/");
        history.create_entry();

        let current = history.current().unwrap();
        assert_eq!(current, &HistoryEntry::default());
        assert!(current.state.is_none());
    }

    #[test]
    fn test_update_current_on_empty_history_creates_entry() {
        let mut history = HistoryList::new();
        assert!(history.current().is_none());

        history.update_current(entry("https://a.com/"));

        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), Some(0));
    }

    #[test]
    fn test_update_current_is_idempotent() {
        let mut history = HistoryList::new();
        visit(&mut history, "https://a.com/");
        visit(&mut history, "https://b.com/");

        history.update_current(entry("https://c.com/"));
        let first = history.entries().to_vec();
        history.update_current(entry("https://c.com/"));

        assert_eq!(history.entries(), first.as_slice());
        assert_eq!(history.cursor(), Some(1));
    }

    #[test]
    fn test_move_out_of_range_fails() {
        let mut history = HistoryList::new();
        assert!(history.move_to(1).is_err());

        visit(&mut history, "https://a.com/");
        visit(&mut history, "https://b.com/");

        assert_eq!(
            history.move_to(-2),
            Err(HistoryError::OutOfRange {
                cursor: 1,
                offset: -2,
                len: 2
            })
        );
        assert!(history.move_to(1).is_err());
        assert_eq!(history.cursor(), Some(1));
    }

    #[test]
    fn test_can_move() {
        let mut history = HistoryList::new();
        assert!(!history.can_move(0));

        visit(&mut history, "https://a.com/");
        visit(&mut history, "https://b.com/");
        visit(&mut history, "https://c.com/");
        history.move_to(-1).unwrap();

        assert!(history.can_move(0));
        assert!(history.can_move(-1));
        assert!(history.can_move(1));
        assert!(!history.can_move(2));
        assert!(!history.can_move(-2));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn arb_url() -> impl Strategy<Value = String> {
            "[a-z]{3,10}".prop_map(|s| format!("https://{s}.com/"))
        }

        fn arb_urls(min: usize, max: usize) -> impl Strategy<Value = Vec<String>> {
            proptest::collection::vec(arb_url(), min..max)
        }

        proptest! {
            #[test]
            fn each_visit_grows_history_by_one(urls in arb_urls(1, 20)) {
                let mut history = HistoryList::new();
                for (i, url) in urls.iter().enumerate() {
                    visit(&mut history, url);
                    prop_assert_eq!(history.len(), i + 1);
                    prop_assert_eq!(history.cursor(), Some(i));
                }
            }

            #[test]
            fn branching_discards_exactly_the_forward_entries(
                urls in arb_urls(2, 12),
                back in 1usize..11,
            ) {
                let mut history = HistoryList::new();
                for url in &urls {
                    visit(&mut history, url);
                }
                let back = back.min(urls.len() - 1);
                history.move_to(-(back as isize)).unwrap();
                visit(&mut history, "https://new.com/");
                prop_assert_eq!(history.len(), urls.len() - back + 1);
                prop_assert!(!history.can_go_forward());
            }

            #[test]
            fn back_then_forward_is_identity(urls in arb_urls(2, 10)) {
                let mut history = HistoryList::new();
                for url in &urls {
                    visit(&mut history, url);
                }
                let before = history.current().cloned();
                history.move_to(-1).unwrap();
                history.move_to(1).unwrap();
                prop_assert_eq!(history.current().cloned(), before);
            }
        }
    }
}
