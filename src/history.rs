use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::record::{MatchRecord, SideHistory};

const FORM_WINDOW: usize = 5;

#[derive(Debug, Clone, Default)]
struct TeamRow {
    played: u32,
    points: u32,
    goals_for: u32,
    goals_against: u32,
    recent: VecDeque<u32>,
    streak: i32,
}

impl TeamRow {
    fn goal_diff(&self) -> i32 {
        self.goals_for as i32 - self.goals_against as i32
    }

    fn snapshot(&self) -> SideHistory {
        SideHistory {
            played: self.played,
            points: self.points,
            goal_diff: self.goal_diff(),
            form_points: self.recent.iter().sum(),
            streak: self.streak,
        }
    }

    fn apply(&mut self, scored: u32, conceded: u32) {
        let pts = if scored > conceded {
            3
        } else if scored == conceded {
            1
        } else {
            0
        };
        self.played += 1;
        self.points += pts;
        self.goals_for += scored;
        self.goals_against += conceded;
        self.recent.push_back(pts);
        if self.recent.len() > FORM_WINDOW {
            self.recent.pop_front();
        }
        self.streak = match pts {
            3 => self.streak.max(0) + 1,
            0 => self.streak.min(0) - 1,
            _ => 0,
        };
    }
}

/// Fills league position and form aggregates from strictly earlier matches
/// of the same season. Matches sharing a date never see each other's result.
/// Positions and histories already present on a record are kept.
pub fn annotate_history(records: &mut [MatchRecord]) {
    let mut by_season: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, r) in records.iter().enumerate() {
        by_season.entry(r.season.clone()).or_default().push(idx);
    }

    for (_, mut indices) in by_season {
        // ISO dates sort lexically; week and team break ties deterministically.
        indices.sort_by(|&a, &b| {
            let (ra, rb) = (&records[a], &records[b]);
            ra.date
                .cmp(&rb.date)
                .then(ra.week.cmp(&rb.week))
                .then(ra.home_team.cmp(&rb.home_team))
        });

        let mut table: HashMap<String, TeamRow> = HashMap::new();
        for &idx in &indices {
            let r = &records[idx];
            table.entry(r.home_team.clone()).or_default();
            table.entry(r.away_team.clone()).or_default();
        }

        let mut start = 0;
        while start < indices.len() {
            let date = records[indices[start]].date.clone();
            let end = indices[start..]
                .iter()
                .position(|&i| records[i].date != date)
                .map_or(indices.len(), |off| start + off);

            let positions = standings(&table);
            for &idx in &indices[start..end] {
                let r = &mut records[idx];
                let home = &table[&r.home_team];
                let away = &table[&r.away_team];
                if r.home_history.is_none() {
                    r.home_history = Some(home.snapshot());
                }
                if r.away_history.is_none() {
                    r.away_history = Some(away.snapshot());
                }
                if r.home_position.is_none() && home.played > 0 {
                    r.home_position = positions.get(&r.home_team).copied();
                }
                if r.away_position.is_none() && away.played > 0 {
                    r.away_position = positions.get(&r.away_team).copied();
                }
            }

            for &idx in &indices[start..end] {
                let r = &records[idx];
                let (Some(hs), Some(aw)) = (r.home_score, r.away_score) else {
                    continue;
                };
                if let Some(row) = table.get_mut(&r.home_team) {
                    row.apply(hs, aw);
                }
                if let Some(row) = table.get_mut(&r.away_team) {
                    row.apply(aw, hs);
                }
            }
            start = end;
        }
    }
}

fn standings(table: &HashMap<String, TeamRow>) -> HashMap<String, u32> {
    let mut rows: Vec<(&String, &TeamRow)> = table.iter().collect();
    rows.sort_by(|(na, a), (nb, b)| {
        b.points
            .cmp(&a.points)
            .then(b.goal_diff().cmp(&a.goal_diff()))
            .then(b.goals_for.cmp(&a.goals_for))
            .then(na.cmp(nb))
    });
    rows.into_iter()
        .enumerate()
        .map(|(i, (name, _))| (name.clone(), i as u32 + 1))
        .collect()
}
