//! End-to-end tests: results artifact -> session -> profiles and figures.

use std::fs;
use std::path::{Path, PathBuf};

use esme_profiles::compute::{isolate_by_sign, Sign};
use esme_profiles::config::PipelineConfig;
use esme_profiles::convert::{list_artifacts, write_profile_csv};
use esme_profiles::graph::LineShape;
use esme_profiles::session::Session;
use esme_profiles::table::PeriodTable;
use esme_profiles::tech_map::TechMap;
use esme_profiles::ProfileError;
use rusqlite::Connection;
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn tech_map() -> TechMap {
    TechMap::load_csv(&fixture_path("tech_map.csv"), "grouping4", "coloring4").unwrap()
}

fn loaded_session() -> Session {
    let session = Session::new(PipelineConfig::default(), tech_map());
    session.load(&fixture_path("run_a")).unwrap();
    session
}

fn column(table: &PeriodTable, name: &str) -> Vec<f64> {
    let idx = table.column_index(name).unwrap();
    table.blocks().iter().flat_map(|b| b.column(idx)).collect()
}

fn labels(table: &PeriodTable) -> Vec<(&str, Vec<u32>)> {
    table
        .blocks()
        .iter()
        .map(|b| (b.label.as_str(), b.steps.clone()))
        .collect()
}

#[test]
fn full_profile_replays_patterns() {
    let profile = loaded_session().full_profile("elec_gb", 1).unwrap();

    assert_eq!(profile.columns(), ["Demand"]);
    assert_eq!(
        labels(&profile),
        [
            ("Winter1", vec![0, 1, 2, 3]),
            ("Summer1", vec![0, 1]),
            ("Winter2", vec![0, 1]),
        ]
    );
    assert_eq!(column(&profile, "Demand"), [10., -5., 10., -5., 3., -1., 7., -2.]);

    let positive = isolate_by_sign(&profile, Sign::Pos);
    assert_eq!(column(&positive, "Demand"), [10., 0., 10., 0., 3., 0., 7., 0.]);
}

#[test]
fn grouping_sums_forward_filled_actors() {
    let profile = loaded_session().full_profile("h2_gb", 1).unwrap();

    assert_eq!(profile.columns(), ["Hydrogen"]);
    // Winter1 step 1 takes Electrolyser=4 from the row above
    assert_eq!(column(&profile, "Hydrogen"), [3., 2., 3., 2., 2., 1., 2., 2.]);
}

#[test]
fn coarser_granularity_averages_buckets() {
    let profile = loaded_session().full_profile("elec_gb", 2).unwrap();
    assert_eq!(
        labels(&profile),
        [("Winter1", vec![0, 2]), ("Summer1", vec![0]), ("Winter2", vec![0])]
    );
    assert_eq!(column(&profile, "Demand"), [2.5, 2.5, 1., 2.5]);
}

#[test]
fn profile_csv_lists_every_row() {
    let profile = loaded_session().full_profile("elec_gb", 1).unwrap();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("elec_gb.csv");
    write_profile_csv(&out, &profile).unwrap();

    let written = fs::read_to_string(&out).unwrap();
    let mut lines = written.lines();
    assert_eq!(lines.next(), Some("p,start,Demand"));
    assert_eq!(lines.next(), Some("Winter1,0,10"));
    assert_eq!(written.lines().count(), 9);
    assert!(written.ends_with("Winter2,1,-2\n"));
}

#[test]
fn sqlite_artifact_matches_csv_artifact() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("run_b.db");
    let conn = Connection::open(&db).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE df_patterns ("index" INTEGER, name TEXT, "order" INTEGER, reps INTEGER, year INTEGER);
        INSERT INTO df_patterns VALUES (0, 'Winter1', 1, 2, 2005), (1, 'Summer1', 2, 1, 2005);
        CREATE TABLE flows_by_w__name_elec_gb (p TEXT, start INTEGER, X REAL);
        INSERT INTO flows_by_w__name_elec_gb VALUES
            ('Winter1', 0, 10), (NULL, 1, -5), ('Summer1', 0, 3), (NULL, 1, -1);
        CREATE TABLE storage_lvl (p TEXT, w INTEGER, battery REAL);
        INSERT INTO storage_lvl VALUES ('Winter1', 0, 1), ('Summer1', 0, 2);
        "#,
    )
    .unwrap();
    drop(conn);

    let config = PipelineConfig {
        nodes: vec!["elec_gb".to_string()],
        ..Default::default()
    };
    let session = Session::new(config, tech_map());
    session.load(&db).unwrap();

    let profile = session.full_profile("elec_gb", 1).unwrap();
    assert_eq!(column(&profile, "Demand"), [10., -5., 10., -5., 3., -1.]);
    assert_eq!(session.results().unwrap().source, db.display().to_string());
}

#[test]
fn full_period_figure_has_one_row_per_node() {
    let figure = loaded_session().render_full(1).unwrap();

    assert_eq!((figure.layout.rows, figure.layout.cols), (2, 1));
    assert!(figure.selector.is_none());
    assert_eq!(figure.traces.len(), 4);

    let demand_pos = &figure.traces[0];
    assert_eq!((demand_pos.row, demand_pos.col), (1, 1));
    assert_eq!(demand_pos.name, "Demand");
    assert_eq!(demand_pos.stack_group, Some(Sign::Pos));
    assert_eq!(demand_pos.color.as_deref(), Some("#1f77b4"));
    assert_eq!(demand_pos.line_shape, LineShape::StepAfter);
    assert_eq!(demand_pos.y, [10., 0., 10., 0., 3., 0., 7., 0.]);
    assert_eq!(figure.traces[1].stack_group, Some(Sign::Neg));
    assert_eq!(figure.traces[2].row, 2);

    let json = serde_json::to_value(&figure).unwrap();
    assert_eq!(json["traces"][0]["stack_group"], "pos");
    assert_eq!(json["traces"][0]["fill"], "tonexty");
    assert_eq!(json["traces"][0]["line_shape"], "step-after");
    assert_eq!(json["traces"][0]["x"]["periods"][2], "Winter1");
    assert_eq!(json["traces"][0]["x"]["steps"][2], 2);
}

#[test]
fn year_figure_has_one_column_per_period() {
    let session = loaded_session();
    let figure = session.render_year(2005, 1).unwrap();

    assert_eq!((figure.layout.rows, figure.layout.cols), (2, 2));
    assert!(figure.layout.shared_y);
    assert!(!figure.show_legend);
    assert_eq!(figure.traces.len(), 8);
    assert!(figure.traces.iter().all(|t| !t.show_legend));

    let summer = figure.traces.iter().find(|t| t.col == 2).unwrap();
    assert_eq!(summer.y, [3., 0.]);

    assert!(matches!(
        session.render_year(1999, 1),
        Err(ProfileError::UnknownYear { year: 1999 })
    ));
}

#[test]
fn dashboard_selects_one_year_at_a_time() {
    let mut figure = loaded_session().render_selectable_year(1).unwrap();

    assert_eq!(figure.title.as_deref(), Some("Displaying values per year"));
    assert_eq!(figure.height, Some(500));
    assert_eq!((figure.layout.rows, figure.layout.cols), (3, 3));
    assert_eq!(figure.layout.row_heights, Some(vec![0.4, 0.2, 0.4]));
    assert_eq!(figure.traces.len(), 18);

    let selector = figure.selector.clone().unwrap();
    let years: Vec<i32> = selector.options.iter().map(|o| o.year).collect();
    assert_eq!(years, [2005, 2006]);
    assert_eq!(selector.active, 0);
    assert_eq!(figure.visible_traces().count(), 12);

    let elec = &figure.traces[0];
    assert_eq!((elec.row, elec.col), (1, 2));
    assert_eq!(elec.y, [0.01, 0.]);
    assert_eq!(elec.legend_group.as_deref(), Some("group1"));

    let h2_store = &figure.traces[4];
    assert_eq!((h2_store.row, h2_store.col), (2, 2));
    assert_eq!(h2_store.y, [0.1, 0.09, 0.08]);
    assert!(h2_store.secondary_y);
    assert!(!figure.traces[5].secondary_y);

    let summer = &figure.traces[6];
    assert_eq!((summer.row, summer.col), (1, 1));

    // each series is listed once per year
    let legend: Vec<usize> = (0..18).filter(|&i| figure.traces[i].show_legend).collect();
    assert_eq!(legend, [0, 2, 4, 5, 12, 14, 16, 17]);

    assert!(figure.select_year(2006));
    let visible: Vec<Option<i32>> = figure.visible_traces().map(|t| t.tag).collect();
    assert_eq!(visible, vec![Some(2006); 6]);
}

#[test]
fn unmapped_actor_has_no_color() {
    let map = TechMap::from_rows(vec![esme_profiles::tech_map::TechRow {
        actor: "X".to_string(),
        group: "Demand".to_string(),
        color: "#1f77b4".to_string(),
    }])
    .unwrap();
    let session = Session::new(PipelineConfig::default(), map);
    session.load(&fixture_path("run_a")).unwrap();

    // grouping passes unmapped actors through; coloring cannot
    let profile = session.full_profile("h2_gb", 1).unwrap();
    assert_eq!(profile.columns(), ["Electrolyser", "H2 turbine"]);
    match session.render_full(1) {
        Err(ProfileError::UnresolvedGroup { group }) => assert_eq!(group, "Electrolyser"),
        other => panic!("expected UnresolvedGroup, got {other:?}"),
    }
}

fn copy_fixture(to: &Path) {
    for entry in fs::read_dir(fixture_path("run_a")).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
    }
}

#[test]
fn pattern_without_rows_is_reported() {
    let dir = TempDir::new().unwrap();
    copy_fixture(dir.path());
    fs::write(
        dir.path().join("df_patterns.csv"),
        "name,order,reps,year\nWinter1,1,1,2005\nSpring1,2,1,2005\n",
    )
    .unwrap();

    let session = Session::new(PipelineConfig::default(), tech_map());
    session.load(dir.path()).unwrap();
    match session.full_profile("elec_gb", 1) {
        Err(ProfileError::MissingPeriod { period, .. }) => assert_eq!(period, "Spring1"),
        other => panic!("expected MissingPeriod, got {other:?}"),
    }
}

#[test]
fn reload_swaps_results_and_keeps_old_snapshot() {
    let dir = TempDir::new().unwrap();
    copy_fixture(dir.path());
    fs::write(
        dir.path().join("df_patterns.csv"),
        "name,order,reps,year\nSummer1,1,3,2007\n",
    )
    .unwrap();

    let session = loaded_session();
    let before = session.results().unwrap();
    session.load(dir.path()).unwrap();

    assert_eq!(before.patterns.len(), 3);
    assert_eq!(session.results().unwrap().patterns.len(), 1);
    let profile = session.full_profile("elec_gb", 1).unwrap();
    assert_eq!(column(&profile, "Demand"), [3., -1., 3., -1., 3., -1.]);

    // a failed load leaves the current results in place
    fs::remove_file(dir.path().join("storage_lvl.csv")).unwrap();
    assert!(matches!(
        session.load(dir.path()),
        Err(ProfileError::Load { .. })
    ));
    assert_eq!(session.results().unwrap().patterns.len(), 1);
}

#[test]
fn dashboard_rejects_a_third_node() {
    let dir = TempDir::new().unwrap();
    copy_fixture(dir.path());
    fs::copy(
        dir.path().join("flows_by_w__name_elec_gb.csv"),
        dir.path().join("flows_by_w__name_heat_gb.csv"),
    )
    .unwrap();
    let config = PipelineConfig {
        nodes: vec!["elec_gb".into(), "h2_gb".into(), "heat_gb".into()],
        ..Default::default()
    };
    let session = Session::new(config, tech_map());
    session.load(dir.path()).unwrap();

    assert!(matches!(
        session.render_selectable_year(1),
        Err(ProfileError::DashboardNodes { count: 3 })
    ));
    assert_eq!(session.render_full(1).unwrap().layout.rows, 3);
}

#[test]
fn artifact_listing_skips_plain_files() {
    let found = list_artifacts(&fixture_path("")).unwrap();
    assert_eq!(found, [fixture_path("run_a")]);
}
