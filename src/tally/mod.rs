use std::collections::HashMap;

use itertools::Itertools;

use crate::db::schema::EventOption;
use crate::support::numbers::{ordinal, percentage};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub id_option: i32,
    pub option: String,
    pub votes: i64,
    pub percentage: f64,
}

/// Final standings of a closed event.
#[derive(Debug, Clone, PartialEq)]
pub struct Results {
    pub id_event: i32,
    pub title: String,
    pub rows: Vec<ResultRow>,
}

impl Results {
    /// Rows come out ordered by votes descending, then by option text.
    pub fn new(id_event: i32, title: &str, options: &[EventOption], counts: &HashMap<i32, i64>) -> Self {
        let total: i64 = options.iter().map(|o| counts.get(&o.id).copied().unwrap_or(0)).sum();

        let rows = options.iter()
            .map(|o| {
                let votes = counts.get(&o.id).copied().unwrap_or(0);

                ResultRow {
                    id_option: o.id,
                    option: o.option.clone(),
                    votes,
                    percentage: percentage(votes, total),
                }
            })
            .sorted_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.option.cmp(&b.option)))
            .collect();

        Self {
            id_event,
            title: title.to_owned(),
            rows,
        }
    }

    pub fn total_votes(&self) -> i64 {
        self.rows.iter().map(|r| r.votes).sum()
    }

    /// Every row sharing the top count. Empty when nobody voted.
    pub fn winners(&self) -> Vec<&ResultRow> {
        let max = match self.rows.first() {
            Some(r) if r.votes > 0 => r.votes,
            _ => return Vec::new(),
        };

        self.rows.iter().take_while(|r| r.votes == max).collect()
    }

    pub fn winner_option_ids(&self) -> Vec<i32> {
        self.winners().iter().map(|r| r.id_option).collect()
    }

    pub fn is_tie(&self) -> bool {
        self.winners().len() > 1
    }

    pub fn render(&self) -> String {
        let mut res_string = format!("{} ({})\n", self.title, self.id_event);

        let mut last = i64::MAX;
        let mut place = 0;
        for (i, row) in self.rows.iter().enumerate() {
            if row.votes < last {
                place = i + 1;
                last = row.votes;
            }
            res_string.push_str(&format!("{}. {} - {} votes ({:.1}%)\n", ordinal(place), row.option, row.votes, row.percentage));
        }

        res_string.push_str(&format!("Total votes: {}\n", self.total_votes()));

        res_string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<EventOption> {
        ["Carol", "Alice", "Bob"].iter().enumerate()
            .map(|(i, v)| EventOption { id_event: 1, id: i as i32 + 10, option: (*v).to_owned() })
            .collect()
    }

    #[test]
    fn rows_sorted_by_votes_then_text() {
        let counts: HashMap<i32, i64> = vec![(10, 2), (11, 5), (12, 2)].into_iter().collect();
        let results = Results::new(1, "Board", &options(), &counts);

        let names = results.rows.iter().map(|r| r.option.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
        assert_eq!(results.total_votes(), 9);
        assert_eq!(results.rows[0].percentage, 55.6);
        assert_eq!(results.rows[1].percentage, 22.2);
        assert_eq!(results.winner_option_ids(), vec![11]);
        assert!(!results.is_tie());
    }

    #[test]
    fn ties_share_the_win() {
        let counts: HashMap<i32, i64> = vec![(10, 3), (11, 3), (12, 1)].into_iter().collect();
        let results = Results::new(1, "Board", &options(), &counts);

        assert!(results.is_tie());
        let mut ids = results.winner_option_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn no_votes_no_winner() {
        let results = Results::new(1, "Board", &options(), &HashMap::new());

        assert_eq!(results.total_votes(), 0);
        assert!(results.winners().is_empty());
        assert!(results.rows.iter().all(|r| r.percentage == 0.0));
    }

    #[test]
    fn render_shares_places_on_ties() {
        let counts: HashMap<i32, i64> = vec![(10, 1), (11, 3), (12, 1)].into_iter().collect();
        let rendered = Results::new(1, "Board", &options(), &counts).render();

        assert!(rendered.contains("1st. Alice - 3 votes (60.0%)"));
        assert!(rendered.contains("2nd. Bob - 1 votes (20.0%)"));
        assert!(rendered.contains("2nd. Carol - 1 votes (20.0%)"));
        assert!(rendered.ends_with("Total votes: 5\n"));
    }
}
