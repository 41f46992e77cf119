//! Integration tests exercising the public API end to end: geometry, pixel adjacency and codec,
//! clustering, fire tracking, and the two SQLite-backed stores.

use chrono::{TimeZone, Utc};
use satfire::{
    BoundingBox, ClusterDatabase, ClusterList, Coord, FireList, FiresDatabase, Pixel, PixelList,
    Satellite, Sector,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

/// Give each test its own SQLite file under the system temp dir so tests can run concurrently
/// without colliding, the way the teacher's own tests isolate database state.
fn unique_db_path(tag: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("satfire-test-{}-{}-{}.sqlite", std::process::id(), tag, n));
    path
}

fn square_pixel(lat: f64, lon: f64, power: f64) -> Pixel {
    Pixel {
        ul: Coord { lat: lat + 0.5, lon: lon - 0.5 },
        ur: Coord { lat: lat + 0.5, lon: lon + 0.5 },
        lr: Coord { lat: lat - 0.5, lon: lon + 0.5 },
        ll: Coord { lat: lat - 0.5, lon: lon - 0.5 },
        power,
        temperature: 320.0,
        area: 1.0e6,
        scan_angle: 1.0,
        mask_flag: 10,
        data_quality_flag: 0,
    }
}

/*-------------------------------------------------------------------------------------------------
 *                                         geo
 *-----------------------------------------------------------------------------------------------*/

#[test]
fn coord_are_close() {
    let left = Coord { lat: 45.5, lon: -120.0 };
    let right = Coord { lat: 45.5000002, lon: -120.0000002 };

    assert!(left.close(left, 1.0e-6));
    assert!(right.close(right, 1.0e-6));
    assert!(left.close(right, 1.0e-6));
    assert!(!left.close(right, 1.0e-8));
}

#[test]
fn bounding_box_contains_and_overlap() {
    let bbox = BoundingBox {
        ll: Coord { lat: 44.0, lon: -120.0 },
        ur: Coord { lat: 45.0, lon: -119.0 },
    };

    assert!(bbox.contains(Coord { lat: 44.5, lon: -119.5 }));
    assert!(!bbox.contains(Coord { lat: 43.0, lon: -119.5 }));

    let overlapping = BoundingBox {
        ll: Coord { lat: 44.5, lon: -119.5 },
        ur: Coord { lat: 46.0, lon: -118.0 },
    };
    let disjoint = BoundingBox {
        ll: Coord { lat: 50.0, lon: -119.5 },
        ur: Coord { lat: 51.0, lon: -118.0 },
    };

    assert!(bbox.overlap(&overlapping, 0.0));
    assert!(!bbox.overlap(&disjoint, 0.0));
}

#[test]
fn bounding_box_union_covers_both() {
    let a = BoundingBox { ll: Coord { lat: 44.0, lon: -120.0 }, ur: Coord { lat: 45.0, lon: -119.0 } };
    let b = BoundingBox { ll: Coord { lat: 46.0, lon: -118.0 }, ur: Coord { lat: 47.0, lon: -117.0 } };

    let union = a.union(&b);
    assert!(union.contains(a.ll) && union.contains(a.ur));
    assert!(union.contains(b.ll) && union.contains(b.ur));
}

/*-------------------------------------------------------------------------------------------------
 *                                         pixel
 *-----------------------------------------------------------------------------------------------*/

#[test]
fn pixel_centroid_of_a_square_is_its_middle() {
    let pxl = square_pixel(44.5, -119.5, 5.0);
    let centroid = pxl.centroid();
    assert!(centroid.close(Coord { lat: 44.5, lon: -119.5 }, 1.0e-9));
}

#[test]
fn pixel_contains_coord_inside_and_outside() {
    let pxl = square_pixel(44.5, -119.5, 5.0);

    assert!(pxl.contains_coord(Coord { lat: 44.5, lon: -119.5 }));
    assert!(!pxl.contains_coord(Coord { lat: 50.0, lon: -119.5 }));
}

#[test]
fn pixel_approx_equal_within_and_outside_tolerance() {
    let pxl1 = square_pixel(44.5, -119.5, 5.0);
    let mut pxl2 = pxl1;
    pxl2.ul.lat += 2.0e-7;

    assert!(pxl1.approx_equal(&pxl2, 1.0e-6));
    assert!(!pxl1.approx_equal(&pxl2, 1.0e-8));
}

#[test]
fn adjacent_pixels_share_an_edge_and_overlapping_pixels_do_not_count_as_adjacent() {
    let left = square_pixel(44.5, -119.5, 5.0);
    let right = square_pixel(44.5, -118.5, 5.0);
    let overlapping = square_pixel(44.5, -119.0, 5.0);

    assert!(left.adjacent(&right, 1.0e-6));
    assert!(left.overlap(&overlapping, 1.0e-6));
    assert!(!left.overlap(&right, 1.0e-6));
}

#[test]
fn pixel_list_serialize_round_trips() {
    let mut list = PixelList::new();
    list.append(square_pixel(44.5, -119.5, 5.0));
    list.append(square_pixel(44.5, -118.5, 9.0));

    let bytes = list.serialize();
    let recovered = PixelList::deserialize(&bytes).unwrap();

    assert_eq!(list.len(), recovered.len());
    for (a, b) in list.iter().zip(recovered.iter()) {
        assert!(a.approx_equal(b, 1.0e-9));
    }
}

/*-------------------------------------------------------------------------------------------------
 *                                         cluster
 *-----------------------------------------------------------------------------------------------*/

#[test]
fn from_pixels_groups_adjacent_pixels_and_drops_cold_ones() {
    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(10);

    let pixels = vec![
        square_pixel(44.5, -119.5, 5.0),
        square_pixel(44.5, -118.5, 9.0), // adjacent to the first, same cluster
        square_pixel(50.0, -100.0, 3.0), // far away, its own cluster
        square_pixel(10.0, 10.0, 0.0),   // zero power, dropped before clustering
    ];

    let clist = ClusterList::from_pixels(Satellite::G17, Sector::FULL, start, end, pixels);

    assert_eq!(clist.len(), 2);
    let total_pixels: usize = clist.clusters().iter().map(|c| c.pixel_count()).sum();
    assert_eq!(total_pixels, 3);
}

#[test]
fn retain_clusters_applies_scan_angle_qc_without_changing_scan_identity() {
    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(10);

    let mut oblique = square_pixel(44.5, -119.5, 5.0);
    oblique.scan_angle = 20.0;

    let pixels = vec![square_pixel(50.0, -100.0, 3.0), oblique];
    let clist = ClusterList::from_pixels(Satellite::G16, Sector::CONUS, start, end, pixels);
    assert_eq!(clist.len(), 2);

    let filtered = clist.retain_clusters(|c| c.max_scan_angle() < 8.3);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered.satellite(), Satellite::G16);
    assert_eq!(filtered.sector(), Sector::CONUS);
}

/*-------------------------------------------------------------------------------------------------
 *                                         fire
 *-----------------------------------------------------------------------------------------------*/

fn cluster_row(
    rowid: u64,
    start: chrono::DateTime<Utc>,
    end: chrono::DateTime<Utc>,
    lat: f64,
    lon: f64,
    power: f64,
) -> satfire::ClusterDatabaseClusterRow {
    let mut pixels = PixelList::new();
    pixels.append(square_pixel(lat, lon, power));

    satfire::ClusterDatabaseClusterRow {
        rowid,
        start,
        end,
        power,
        max_temperature: 330.0,
        area: 1.0e6,
        scan_angle: 1.0,
        centroid: Coord { lat, lon },
        sector: Sector::FULL,
        sat: Satellite::G17,
        pixels,
    }
}

#[test]
fn fire_list_leaves_spatially_distinct_fires_unmerged() {
    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::hours(2);

    let mut fires = FireList::new();
    fires.create_add_fire(1, cluster_row(1, start, end, 44.5, -119.5, 5.0));
    fires.create_add_fire(2, cluster_row(2, start, end, 60.0, 10.0, 7.0));
    assert_eq!(fires.len(), 2);

    let mut merged_away = FireList::new();
    let merges = fires.merge_fires(&mut merged_away);

    assert!(merges.is_empty());
    assert_eq!(fires.len(), 2);
}

#[test]
fn merged_fire_associations_follow_the_surviving_fire_id() {
    let cluster_path = unique_db_path("merge-clusters");
    let fires_path = unique_db_path("merge-fires");

    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::hours(3);

    let cluster_db = ClusterDatabase::connect(&cluster_path).unwrap();
    {
        let mut adder = cluster_db.prepare_to_add_clusters().unwrap();
        adder
            .add(ClusterList::from_pixels(
                Satellite::G17,
                Sector::FULL,
                start,
                end,
                vec![square_pixel(44.5, -119.5, 5.0)],
            ))
            .unwrap();
        adder
            .add(ClusterList::from_pixels(
                Satellite::G17,
                Sector::FULL,
                start,
                end,
                vec![square_pixel(44.5, -118.5, 7.0)],
            ))
            .unwrap();
    }

    // Recover the actual rowids SQLite assigned so the test doesn't assume insertion order.
    let rowids: Vec<u64> = {
        let area = BoundingBox::global();
        let mut query = cluster_db
            .query_clusters(Some(Satellite::G17), Some(Sector::FULL), start, end, area)
            .unwrap();
        query
            .rows()
            .unwrap()
            .collect::<satfire::SatFireResult<Vec<_>>>()
            .unwrap()
            .into_iter()
            .map(|r| r.rowid)
            .collect()
    };
    assert_eq!(rowids.len(), 2);

    // Two fires, spatially adjacent (sharing an edge), that merge_fires will fold into one.
    let mut fires = FireList::new();
    fires.create_add_fire(5, cluster_row(rowids[0], start, end, 44.5, -119.5, 5.0));
    fires.create_add_fire(9, cluster_row(rowids[1], start, end, 44.5, -118.5, 7.0));

    let fires_db = FiresDatabase::connect(&fires_path).unwrap();
    let mut add_fire = fires_db.prepare_to_add_fires().unwrap();
    add_fire.add_association(5, rowids[0]);
    add_fire.add_association(9, rowids[1]);

    let mut merged_away = FireList::new();
    let merges = fires.merge_fires(&mut merged_away);
    assert_eq!(merges, vec![(9, 5)]);
    for (losing_id, surviving_id) in merges {
        add_fire.remap_association(losing_id, surviving_id);
    }

    fires.extend(&mut merged_away);
    add_fire.add_fires(&fires).unwrap();
    drop(add_fire);
    drop(fires_db);

    let dbs = satfire::JointFiresClusterDatabases::connect(&cluster_path, &fires_path).unwrap();
    let mut query = dbs.single_fire_query().unwrap();

    let survivor_rows: Vec<_> = query.run(5).unwrap().collect::<satfire::SatFireResult<Vec<_>>>().unwrap();
    assert_eq!(survivor_rows.len(), 2);

    let loser_rows: Vec<_> = query.run(9).unwrap().collect::<satfire::SatFireResult<Vec<_>>>().unwrap();
    assert!(loser_rows.is_empty());

    let _ = std::fs::remove_file(&cluster_path);
    let _ = std::fs::remove_file(&fires_path);
}

#[test]
fn fire_drains_once_it_goes_stale() {
    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::hours(1);

    let mut fires = FireList::new();
    fires.create_add_fire(1, cluster_row(1, start, end, 44.5, -119.5, 5.0));

    let mut stale = FireList::new();
    let still_fresh = fires.drain_stale_fires(&mut stale, end + chrono::Duration::hours(1));
    assert_eq!(still_fresh, 0);
    assert_eq!(fires.len(), 1);

    let drained = fires.drain_stale_fires(&mut stale, end + chrono::Duration::days(2));
    assert_eq!(drained, 1);
    assert!(fires.is_empty());
    assert_eq!(stale.len(), 1);
}

/*-------------------------------------------------------------------------------------------------
 *                                         database
 *-----------------------------------------------------------------------------------------------*/

#[test]
fn cluster_database_round_trips_a_commit_and_answers_presence_queries() {
    let path = unique_db_path("clusters");
    let db = ClusterDatabase::connect(&path).unwrap();

    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(10);

    let pixels = vec![square_pixel(44.5, -119.5, 5.0), square_pixel(44.5, -118.5, 9.0)];
    let clist = ClusterList::from_pixels(Satellite::G17, Sector::FULL, start, end, pixels);

    {
        let mut adder = db.prepare_to_add_clusters().unwrap();
        adder.add(clist).unwrap();
    }

    {
        let mut presence = db.prepare_to_query_clusters_present().unwrap();
        assert!(presence.present(Satellite::G17, Sector::FULL, start, end).unwrap());
        assert!(!presence.present_no_fire(Satellite::G17, Sector::FULL, start, end).unwrap());
        assert!(!presence.present(Satellite::G16, Sector::FULL, start, end).unwrap());
    }

    let area = BoundingBox::global();
    let mut query = db
        .query_clusters(Some(Satellite::G17), Some(Sector::FULL), start, end, area)
        .unwrap();
    let rows: Vec<_> = query.rows().unwrap().collect::<satfire::SatFireResult<Vec<_>>>().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].power > 0.0);

    assert_eq!(db.newest_scan_start(Satellite::G17, Sector::FULL).unwrap(), start);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn cluster_database_no_fire_scan_is_present_but_has_no_clusters() {
    let path = unique_db_path("no-fire");
    let db = ClusterDatabase::connect(&path).unwrap();

    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(10);

    let empty = ClusterList::from_pixels(Satellite::G16, Sector::CONUS, start, end, vec![]);
    {
        let mut adder = db.prepare_to_add_clusters().unwrap();
        adder.add(empty).unwrap();
    }

    let mut presence = db.prepare_to_query_clusters_present().unwrap();
    assert!(presence.present(Satellite::G16, Sector::CONUS, start, end).unwrap());
    assert!(presence.present_no_fire(Satellite::G16, Sector::CONUS, start, end).unwrap());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn fires_database_round_trips_fires_long_enough_to_survive_the_duration_filter() {
    let path = unique_db_path("fires");
    let db = FiresDatabase::connect(&path).unwrap();

    let start = Utc.with_ymd_and_hms(2021, 8, 1, 1, 0, 0).unwrap();
    let end = start + chrono::Duration::hours(3);

    let row = cluster_row(1, start, end, 44.5, -119.5, 12.0);

    let mut fires = FireList::new();
    fires.create_add_fire(db.next_wildfire_id().unwrap(), row);

    {
        let mut adder = db.prepare_to_add_fires().unwrap();
        adder.add_fires(&fires).unwrap();
    }

    assert_eq!(db.last_observed(Satellite::G17).unwrap(), end);

    let ongoing = db.ongoing_fires(Satellite::G17).unwrap();
    assert_eq!(ongoing.len(), 1);
    assert_eq!(ongoing.iter().next().unwrap().max_power(), 12.0);

    let area = BoundingBox::global();
    let mut query = db
        .query_fires(
            Some(Satellite::G17),
            start - chrono::Duration::hours(1),
            end + chrono::Duration::hours(1),
            area,
        )
        .unwrap();
    let found: Vec<_> = query.rows().unwrap().collect::<satfire::SatFireResult<Vec<_>>>().unwrap();
    assert_eq!(found.len(), 1);

    let _ = std::fs::remove_file(&path);
}
