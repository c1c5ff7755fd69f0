//! Linearizes a hierarchical roadmap into a week-bucketed study timeline.
//!
//! Subtopics are flattened in level -> section -> subtopic order, ordered so
//! that every prerequisite comes first, then packed greedily into weeks of a
//! fixed study-hour capacity. Cyclic prerequisite data never fails the call:
//! each cycle is severed at the back-edge that closes it.

use chrono::{Days, NaiveDate};
use std::collections::{HashMap, HashSet};

use crate::log_timeline_event;
use crate::models::{
    PrerequisitesMap, RoadmapStructure, TimelineDuration, TimelineItem, TimelineItemType,
    TimelineWeek,
};

pub const HOURS_PER_WEEK: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineOptions {
    pub hours_per_week: f64,
    pub start_date: Option<NaiveDate>,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            hours_per_week: HOURS_PER_WEEK,
            start_date: None,
        }
    }
}

impl TimelineOptions {
    fn capacity(&self) -> f64 {
        if self.hours_per_week.is_finite() && self.hours_per_week > 0.0 {
            self.hours_per_week
        } else {
            HOURS_PER_WEEK
        }
    }
}

/// A prerequisite edge removed to make the graph acyclic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenEdge {
    pub item_id: String,
    pub prerequisite_id: String,
}

/// Prerequisite-ordered items plus a record of what was dropped to get there.
#[derive(Debug, Clone, Default)]
pub struct Linearization {
    pub items: Vec<TimelineItem>,
    pub broken_edges: Vec<BrokenEdge>,
    pub dangling_references: usize,
}

/// Build the weekly timeline with the default 20 hour weekly capacity.
pub fn generate_timeline(
    structure: &RoadmapStructure,
    prerequisites: Option<&PrerequisitesMap>,
    start_date: Option<NaiveDate>,
) -> Vec<TimelineWeek> {
    let options = TimelineOptions {
        start_date,
        ..TimelineOptions::default()
    };
    generate_timeline_with(structure, prerequisites, options)
}

pub fn generate_timeline_with(
    structure: &RoadmapStructure,
    prerequisites: Option<&PrerequisitesMap>,
    options: TimelineOptions,
) -> Vec<TimelineWeek> {
    let linearization = linearize(structure, prerequisites);
    let weeks = pack_into_weeks(linearization.items, &options);

    log_timeline_event!(
        generated,
        weeks = weeks.len(),
        broken_edges = linearization.broken_edges.len(),
        dangling = linearization.dangling_references
    );

    weeks
}

/// Flatten the structure and order it so prerequisites always come first.
pub fn linearize(
    structure: &RoadmapStructure,
    prerequisites: Option<&PrerequisitesMap>,
) -> Linearization {
    let items = flatten_structure(structure, prerequisites);
    if items.is_empty() {
        return Linearization::default();
    }

    let (graph, dangling_references) = build_prerequisite_graph(&items);
    let (acyclic, broken) = break_cycles(graph);

    let broken_edges = broken
        .into_iter()
        .map(|(item, prerequisite)| {
            let edge = BrokenEdge {
                item_id: items[item].id.clone(),
                prerequisite_id: items[prerequisite].id.clone(),
            };
            log_timeline_event!(cycle_broken, item = edge.item_id, prerequisite = edge.prerequisite_id);
            edge
        })
        .collect();

    let order = topological_order(&acyclic);
    let mut slots: Vec<Option<TimelineItem>> = items.into_iter().map(Some).collect();
    let items = order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect();

    Linearization {
        items,
        broken_edges,
        dangling_references,
    }
}

/// One item per subtopic in document order. Prerequisites come from the
/// subtopic's map entry, then its section's entry, then nothing.
pub fn flatten_structure(
    structure: &RoadmapStructure,
    prerequisites: Option<&PrerequisitesMap>,
) -> Vec<TimelineItem> {
    let lookup = |id: &str| {
        prerequisites
            .and_then(|map| map.get(id))
            .map(|entry| entry.required_topics.clone())
    };

    structure
        .subtopics()
        .map(|(level, section, subtopic)| TimelineItem {
            id: subtopic.id.clone(),
            title: subtopic.title.clone(),
            description: subtopic.description.clone(),
            item_type: TimelineItemType::Subtopic,
            estimated_hours: subtopic.effective_hours(),
            prerequisites: lookup(subtopic.id.as_str())
                .or_else(|| lookup(section.id.as_str()))
                .unwrap_or_default(),
            level_id: level.id.clone(),
            section_id: section.id.clone(),
        })
        .collect()
}

/// Adjacency by item index. References that name no item are skipped and counted.
fn build_prerequisite_graph(items: &[TimelineItem]) -> (Vec<Vec<usize>>, usize) {
    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        index_of.entry(item.id.as_str()).or_insert(index);
    }

    let mut dangling = 0;
    let graph: Vec<Vec<usize>> = items
        .iter()
        .map(|item| {
            item.prerequisites
                .iter()
                .filter_map(|id| {
                    let resolved = index_of.get(id.as_str()).copied();
                    if resolved.is_none() {
                        dangling += 1;
                    }
                    resolved
                })
                .collect::<Vec<usize>>()
        })
        .collect();

    (graph, dangling)
}

/// Depth-first walk over the prerequisite graph that removes every edge whose
/// target is still on the walk's stack. Returns the acyclic graph and the
/// removed `(item, prerequisite)` pairs in detection order.
fn break_cycles(mut graph: Vec<Vec<usize>>) -> (Vec<Vec<usize>>, Vec<(usize, usize)>) {
    let mut broken = Vec::new();
    let mut visiting: HashSet<usize> = HashSet::new();
    let mut visited: HashSet<usize> = HashSet::new();

    for root in 0..graph.len() {
        if visited.contains(&root) {
            continue;
        }

        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        visiting.insert(root);

        while let Some(&(node, cursor)) = stack.last() {
            if cursor >= graph[node].len() {
                stack.pop();
                visiting.remove(&node);
                visited.insert(node);
                continue;
            }

            let prerequisite = graph[node][cursor];
            if visiting.contains(&prerequisite) {
                // Cursor stays put: the next edge slides into this slot.
                graph[node].remove(cursor);
                broken.push((node, prerequisite));
                continue;
            }

            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if !visited.contains(&prerequisite) {
                visiting.insert(prerequisite);
                stack.push((prerequisite, 0));
            }
        }
    }

    (graph, broken)
}

/// Post-order walk in index order: each item lands after all its prerequisites.
fn topological_order(graph: &[Vec<usize>]) -> Vec<usize> {
    let mut sorted = Vec::with_capacity(graph.len());
    let mut visiting: HashSet<usize> = HashSet::new();
    let mut visited: HashSet<usize> = HashSet::new();

    for root in 0..graph.len() {
        if visited.contains(&root) {
            continue;
        }

        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        visiting.insert(root);

        while let Some(&(node, cursor)) = stack.last() {
            if let Some(&prerequisite) = graph[node].get(cursor) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if !visited.contains(&prerequisite) && visiting.insert(prerequisite) {
                    stack.push((prerequisite, 0));
                }
            } else {
                stack.pop();
                visiting.remove(&node);
                if visited.insert(node) {
                    sorted.push(node);
                }
            }
        }
    }

    sorted
}

fn pack_into_weeks(items: Vec<TimelineItem>, options: &TimelineOptions) -> Vec<TimelineWeek> {
    let capacity = options.capacity();
    let mut weeks: Vec<TimelineWeek> = Vec::new();
    let mut current = TimelineWeek {
        week_number: 1,
        start_date: None,
        end_date: None,
        items: Vec::new(),
        total_hours: 0.0,
    };

    for item in items {
        if !current.items.is_empty() && current.total_hours + item.estimated_hours > capacity {
            let next_number = current.week_number + 1;
            weeks.push(std::mem::replace(
                &mut current,
                TimelineWeek {
                    week_number: next_number,
                    start_date: None,
                    end_date: None,
                    items: Vec::new(),
                    total_hours: 0.0,
                },
            ));
        }

        current.total_hours += item.estimated_hours;
        current.items.push(item);
    }

    if !current.items.is_empty() {
        weeks.push(current);
    }

    assign_dates(&mut weeks, options.start_date, capacity);
    weeks
}

/// Days a week spans at `capacity` hours per seven days.
fn days_for_hours(total_hours: f64, capacity: f64) -> u64 {
    (total_hours * 7.0 / capacity).ceil().max(0.0) as u64
}

fn assign_dates(weeks: &mut [TimelineWeek], start_date: Option<NaiveDate>, capacity: f64) {
    let mut next_start = start_date;

    for week in weeks.iter_mut() {
        let Some(start) = next_start else {
            break;
        };
        let end = start.checked_add_days(Days::new(days_for_hours(week.total_hours, capacity)));

        week.start_date = Some(start);
        week.end_date = end;
        next_start = end.and_then(|end| end.checked_add_days(Days::new(1)));
    }
}

/// Rough whole-roadmap duration at `hours_per_week`, counted from `from`.
///
/// Hours come from the metadata total when present, otherwise from the most
/// specific hint available at each level of the tree.
pub fn estimate_timeline_duration(
    structure: &RoadmapStructure,
    hours_per_week: f64,
    from: NaiveDate,
) -> TimelineDuration {
    let positive = |hours: Option<f64>| hours.filter(|h| h.is_finite() && *h > 0.0);

    let total_hours = structure
        .metadata
        .as_ref()
        .and_then(|metadata| positive(metadata.total_estimated_hours))
        .unwrap_or_else(|| {
            structure
                .levels
                .iter()
                .map(|level| {
                    positive(level.estimated_hours).unwrap_or_else(|| {
                        level
                            .sections
                            .iter()
                            .map(|section| {
                                positive(section.estimated_hours).unwrap_or_else(|| {
                                    section.subtopics.iter().map(|s| s.effective_hours()).sum()
                                })
                            })
                            .sum()
                    })
                })
                .sum()
        });

    let capacity = TimelineOptions {
        hours_per_week,
        start_date: None,
    }
    .capacity();
    let total_weeks = (total_hours / capacity).ceil() as u32;
    let estimated_completion_date = from
        .checked_add_days(Days::new(u64::from(total_weeks) * 7))
        .unwrap_or(from);

    TimelineDuration {
        total_weeks,
        total_hours,
        estimated_completion_date,
    }
}
