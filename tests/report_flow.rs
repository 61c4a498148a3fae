use std::sync::Arc;

use herbarium::auth::SessionUser;
use herbarium::error::Error;
use herbarium::report::{
    available_families, available_years, export_csv, DashboardSummary, ReportFilter, ReportKind,
    ReportViews,
};
use herbarium::specimen::{ConservationStatus, Coordinates, Location, NewSpecimen, SpecimenAccess};
use herbarium::store::MemoryStore;
use herbarium::users::{AccountStatus, Role};

fn curator(role: Role) -> SessionUser {
    SessionUser {
        id: "u-admin".to_string(),
        email: "curator@uni.edu".to_string(),
        role,
        status: AccountStatus::Active,
        first_name: "Maria".to_string(),
        last_name: "Silva".to_string(),
    }
}

fn sheet(name: &str, family: &str, date: &str, city: &str, status: ConservationStatus) -> NewSpecimen {
    NewSpecimen {
        scientific_name: name.to_string(),
        family: family.to_string(),
        collection_date: date.to_string(),
        location: Location {
            country: "Brazil".to_string(),
            state: "MG".to_string(),
            city: city.to_string(),
            coordinates: Some(Coordinates::new(-19.9, -43.9)),
        },
        conservation_status: status,
        ..Default::default()
    }
}

async fn catalog() -> SpecimenAccess<MemoryStore> {
    let access = SpecimenAccess::new(Arc::new(MemoryStore::new()));
    for specimen in [
        sheet("Cattleya walkeriana", "Orchidaceae", "2024-03-02", "Ouro Preto", ConservationStatus::Vulnerable),
        sheet("Laelia purpurata", "Orchidaceae", "2024-03-20", "Mariana", ConservationStatus::Endangered),
        sheet("Vellozia squamata", "Velloziaceae", "2023-11-05", "Ouro Preto", ConservationStatus::LeastConcern),
        sheet("Paepalanthus bromelioides", "Eriocaulaceae", "2024-01-10", "Diamantina", ConservationStatus::CriticallyEndangered),
    ] {
        access.add_specimen(specimen).await.unwrap();
    }
    access
}

#[tokio::test]
async fn filtered_views_export_as_csv() {
    let access = catalog().await;
    let specimens = access.get_all_specimens().await.into_result().unwrap();

    assert_eq!(available_years(&specimens), vec![2024, 2023]);
    assert_eq!(
        available_families(&specimens),
        vec!["Eriocaulaceae", "Orchidaceae", "Velloziaceae"]
    );

    let filter = ReportFilter::parse("2024", "all").unwrap();
    let views = ReportViews::compute(&specimens, &filter);
    assert_eq!(views.filter_matches, 3);

    let admin = curator(Role::Admin);
    let families = export_csv(Some(&admin), ReportKind::Family, &views, &[]).unwrap();
    assert_eq!(
        families.body,
        "Family,Count\nOrchidaceae,2\nEriocaulaceae,1\n"
    );

    let trend = export_csv(Some(&admin), ReportKind::Trend, &views, &[]).unwrap();
    assert_eq!(trend.body, "Month,Count\n2024-01,1\n2024-03,2\n");

    let selected = filter.apply(&specimens);
    let full = export_csv(Some(&admin), ReportKind::FullRecords, &views, &selected).unwrap();
    assert_eq!(full.body.lines().count(), 4);
    assert!(full.body.contains("\"Ouro Preto, MG, Brazil\""));

    let dir = tempfile::tempdir().unwrap();
    let path = full.write_to(dir.path()).await.unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), full.body);
}

#[tokio::test]
async fn dashboard_counts_threatened_specimens() {
    let access = catalog().await;
    let specimens = access.get_all_specimens().await.value;
    let summary = DashboardSummary::compute(&specimens);

    assert_eq!(summary.total_specimens, 4);
    assert_eq!(summary.distinct_families, 3);
    assert_eq!(summary.threatened, 3);
    assert_eq!(summary.with_coordinates, 4);
    assert_eq!(summary.recent.len(), 4);
}

#[tokio::test]
async fn researchers_cannot_export() {
    let access = catalog().await;
    let specimens = access.get_all_specimens().await.value;
    let views = ReportViews::compute(&specimens, &ReportFilter::all());

    assert!(matches!(
        export_csv(Some(&curator(Role::Researcher)), ReportKind::Location, &views, &[]),
        Err(Error::Forbidden(_))
    ));
}
