//! Place/Visit Detector (§4.4.3): a secondary ingester that turns raw
//! `location.gps` samples into `place` and `place.visit` entities by
//! density-based clustering followed by per-place visit detection.

use chrono::{DateTime, Duration, Utc};
use geo::{Distance, Haversine, Point};
use serde_json::json;
use uuid::Uuid;

use super::entity::{LocSource, NewEntity};
use super::payload::{EntityPayload, PlaceMetaPayload, VisitMetaPayload};

/// Parameters governing cluster discovery and the significance filter that
/// decides which clusters become persisted places.
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub epsilon_meters: f64,
    pub min_samples: usize,
    pub min_visit_count: u32,
    pub min_total_dwell_hours: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            epsilon_meters: 50.0,
            min_samples: 5,
            min_visit_count: 2,
            min_total_dwell_hours: 0.5,
        }
    }
}

/// Parameters governing visit detection within an already-discovered place.
#[derive(Debug, Clone, Copy)]
pub struct VisitParams {
    pub max_gap_minutes: i64,
    pub min_dwell_minutes: i64,
}

impl Default for VisitParams {
    fn default() -> Self {
        Self {
            max_gap_minutes: 20,
            min_dwell_minutes: 10,
        }
    }
}

/// A single `location.gps` sample, the raw material for clustering.
#[derive(Debug, Clone, Copy)]
pub struct GpsSample {
    pub id: Uuid,
    pub lat: f64,
    pub lon: f64,
    pub t_start: DateTime<Utc>,
}

impl GpsSample {
    fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

struct PlaceCandidate {
    cluster_index: usize,
    centroid: Point<f64>,
    radius_meters: f64,
    member_count: usize,
}

/// DBSCAN-style density clustering over haversine distance: a point is a
/// core point if at least `min_samples` other points (including itself)
/// lie within `epsilon_meters`; clusters grow by density-reachability.
fn cluster(samples: &[GpsSample], params: &ClusterParams) -> Vec<PlaceCandidate> {
    let n = samples.len();
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_cluster = 0usize;

    let neighbors = |idx: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| {
                j != idx
                    && Haversine.distance(samples[idx].point(), samples[j].point())
                        <= params.epsilon_meters
            })
            .collect()
    };

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut seed_set = neighbors(i);
        if seed_set.len() + 1 < params.min_samples {
            continue;
        }

        let cluster_id = next_cluster;
        next_cluster += 1;
        labels[i] = Some(cluster_id);

        let mut j = 0;
        while j < seed_set.len() {
            let q = seed_set[j];
            if !visited[q] {
                visited[q] = true;
                let q_neighbors = neighbors(q);
                if q_neighbors.len() + 1 >= params.min_samples {
                    for candidate in q_neighbors {
                        if !seed_set.contains(&candidate) {
                            seed_set.push(candidate);
                        }
                    }
                }
            }
            if labels[q].is_none() {
                labels[q] = Some(cluster_id);
            }
            j += 1;
        }
    }

    (0..next_cluster)
        .filter_map(|cluster_id| {
            let members: Vec<&GpsSample> = samples
                .iter()
                .zip(labels.iter())
                .filter(|(_, label)| **label == Some(cluster_id))
                .map(|(sample, _)| sample)
                .collect();
            if members.is_empty() {
                return None;
            }
            let mean_lat = members.iter().map(|s| s.lat).sum::<f64>() / members.len() as f64;
            let mean_lon = members.iter().map(|s| s.lon).sum::<f64>() / members.len() as f64;
            let centroid = Point::new(mean_lon, mean_lat);

            let mut distances: Vec<f64> = members
                .iter()
                .map(|s| Haversine.distance(centroid, s.point()))
                .collect();
            distances.sort_by(|a, b| a.partial_cmp(b).expect("distances are finite"));
            let radius_meters = percentile(&distances, 0.95);

            Some(PlaceCandidate {
                cluster_index: cluster_id,
                centroid,
                radius_meters,
                member_count: members.len(),
            })
        })
        .collect()
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// A detected visit to a place, prior to significance filtering.
#[derive(Debug, Clone)]
struct DetectedVisit {
    entry: DateTime<Utc>,
    exit: DateTime<Utc>,
    entry_sample_id: Uuid,
    exit_sample_id: Uuid,
    gap_before_minutes: f64,
}

fn detect_visits(
    ordered_samples: &[GpsSample],
    centroid: Point<f64>,
    radius_meters: f64,
    previous_exit: &mut Option<DateTime<Utc>>,
    params: &VisitParams,
) -> Vec<DetectedVisit> {
    let mut visits = Vec::new();
    let mut open: Option<(usize, DateTime<Utc>)> = None;
    let mut last_inside_index: Option<usize> = None;

    for (idx, sample) in ordered_samples.iter().enumerate() {
        let inside = Haversine.distance(centroid, sample.point()) <= radius_meters;
        if !inside {
            if let Some((start_idx, start_time)) = open.take() {
                close_visit(
                    &mut visits,
                    ordered_samples,
                    start_idx,
                    start_time,
                    last_inside_index.expect("open visit has at least one inside sample"),
                    previous_exit,
                    params,
                );
            }
            continue;
        }

        match open {
            None => {
                open = Some((idx, sample.t_start));
                last_inside_index = Some(idx);
            }
            Some((start_idx, start_time)) => {
                let previous_inside = ordered_samples[last_inside_index.expect("tracked")];
                let gap = sample.t_start - previous_inside.t_start;
                if gap > Duration::minutes(params.max_gap_minutes) {
                    close_visit(
                        &mut visits,
                        ordered_samples,
                        start_idx,
                        start_time,
                        last_inside_index.expect("tracked"),
                        previous_exit,
                        params,
                    );
                    open = Some((idx, sample.t_start));
                }
                last_inside_index = Some(idx);
            }
        }
    }

    if let (Some((start_idx, start_time)), Some(last_idx)) = (open, last_inside_index) {
        close_visit(
            &mut visits,
            ordered_samples,
            start_idx,
            start_time,
            last_idx,
            previous_exit,
            params,
        );
    }

    visits
}

fn close_visit(
    visits: &mut Vec<DetectedVisit>,
    samples: &[GpsSample],
    start_idx: usize,
    start_time: DateTime<Utc>,
    end_idx: usize,
    previous_exit: &mut Option<DateTime<Utc>>,
    params: &VisitParams,
) {
    let end_time = samples[end_idx].t_start;
    let dwell = end_time - start_time;
    if dwell >= Duration::minutes(params.min_dwell_minutes) {
        let gap_before_minutes = previous_exit
            .map(|exit| (start_time - exit).num_seconds() as f64 / 60.0)
            .unwrap_or(0.0);
        visits.push(DetectedVisit {
            entry: start_time,
            exit: end_time,
            entry_sample_id: samples[start_idx].id,
            exit_sample_id: samples[end_idx].id,
            gap_before_minutes,
        });
    }
    *previous_exit = Some(end_time);
}

/// Output of a full detection pass: the places and visits to persist.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub places: Vec<NewEntity>,
    pub visits: Vec<NewEntity>,
}

/// Run cluster discovery and visit detection over a full, time-ordered
/// `location.gps` sample set, applying the significance filter before any
/// place/visit entity is emitted.
///
/// `ordered_samples` must be sorted ascending by `t_start`; the caller
/// (the outbound adapter) is responsible for the ordering, since it is the
/// one issuing the indexed query.
pub fn detect(
    ordered_samples: &[GpsSample],
    cluster_params: &ClusterParams,
    visit_params: &VisitParams,
) -> DetectionResult {
    let candidates = cluster(ordered_samples, cluster_params);
    let mut result = DetectionResult::default();

    for candidate in candidates {
        let mut previous_exit = None;
        let visits = detect_visits(
            ordered_samples,
            candidate.centroid,
            candidate.radius_meters,
            &mut previous_exit,
            visit_params,
        );

        let total_dwell_hours: f64 = visits
            .iter()
            .map(|v| (v.exit - v.entry).num_seconds() as f64 / 3600.0)
            .sum();
        let significant = visits.len() as u32 >= cluster_params.min_visit_count
            || total_dwell_hours >= cluster_params.min_total_dwell_hours;
        if !significant {
            continue;
        }

        let place_id = Uuid::new_v4();
        let external_id = format!("cluster_{}", candidate.cluster_index);
        result.places.push(NewEntity {
            id: Some(place_id),
            entity_type: "place".to_owned(),
            // Places are timeless: `t_start` is pinned to a fixed sentinel
            // rather than the detection run's wall-clock time, so upserting
            // the same cluster on a later re-run does not drift the row out
            // of a time-scoped query window.
            t_start: DateTime::<Utc>::MIN_UTC,
            t_end: None,
            lat: Some(candidate.centroid.y()),
            lon: Some(candidate.centroid.x()),
            name: None,
            color: None,
            render_offset: 0.0,
            source: Some("place_detector".to_owned()),
            external_id: Some(external_id.clone()),
            loc_source: Some(LocSource::Inferred),
            payload: Some(EntityPayload::PlaceMeta(PlaceMetaPayload {
                cluster_k: candidate.cluster_index as u32,
                member_count: candidate.member_count as u32,
                radius_meters: candidate.radius_meters,
            })),
        });

        for visit in visits {
            let dwell_minutes = (visit.exit - visit.entry).num_seconds() as f64 / 60.0;
            result.visits.push(NewEntity {
                id: None,
                entity_type: "place.visit".to_owned(),
                t_start: visit.entry,
                t_end: Some(visit.exit),
                lat: Some(candidate.centroid.y()),
                lon: Some(candidate.centroid.x()),
                name: None,
                color: None,
                render_offset: 0.0,
                source: Some("place_detector".to_owned()),
                external_id: Some(format!(
                    "visit_{}_cluster_{}",
                    visit.entry.to_rfc3339(),
                    candidate.cluster_index
                )),
                loc_source: Some(LocSource::Inferred),
                payload: Some(EntityPayload::VisitMeta(VisitMetaPayload {
                    place_id,
                    dwell_minutes,
                    gap_before_minutes: Some(visit.gap_before_minutes),
                    entry_sample_id: visit.entry_sample_id,
                    exit_sample_id: visit.exit_sample_id,
                })),
            });
        }
    }

    result
}

/// The JSON shape a rename propagation must match within a `place.visit`
/// payload (`payload.place_id`); kept separate from [`EntityPayload`]'s
/// typed variant so the persistence adapter can match it in raw SQL too.
pub fn visit_references_place(payload_place_id: &str, place_id: Uuid) -> bool {
    payload_place_id == place_id.to_string()
}
