use std::sync::Arc;

use cabinet_api::{ApiError, CabinetApi, InProcApi, UploadRequest};
use cabinet_ingest::{IngestConfig, LogService};
use cabinet_stats::ReportProfile;
use cabinet_xlsx::XlsxRenderer;

#[tokio::test(flavor = "multi_thread")]
async fn upload_then_lookup() {
    let tmp = tempfile::tempdir().unwrap();
    let svc = Arc::new(LogService::new(IngestConfig::new(tmp.path()), Arc::new(XlsxRenderer::new()), ReportProfile::reference()));
    let api = InProcApi::new(Arc::clone(&svc));

    let req = UploadRequest {
        date: Some("1650000000".into()),
        log: Some(b"hello".to_vec()),
        stats: Some(b"0 a 1\n500 b 2\n1500 a 3\n".to_vec()),
        stats_map: Some(br#"{"a": "mtr_spd", "b": "steer"}"#.to_vec()),
    };
    let m = api.upload(req).await.unwrap();
    assert_eq!(m.id, 0);
    assert_eq!(m.created_at.timestamp(), 1_650_000_000);

    svc.wait_idle().await;
    let s = api.get(0).await.unwrap();
    assert!(s.has_report);
    assert_eq!(api.list().await.unwrap().len(), 1);
    assert!(matches!(api.get(1).await, Err(ApiError::NotFound(_))));

    let bad = api.upload(UploadRequest { date: Some("1".into()), ..Default::default() }).await;
    assert!(matches!(bad, Err(ApiError::Validation(_))));
    assert_eq!(api.list().await.unwrap().len(), 1);
    svc.shutdown().await;
}
