mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations/write")]
async fn test_summary_counts_records_per_category(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool);
    for duration in [20, 40] {
        let activity = json!({
            "activity_type": "walking",
            "duration": duration,
            "intensity": 3,
            "date": "2024-01-02"
        });
        let (status, _) = common::post_json(app.clone(), "/api/activity", 6, &activity).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let checkin = json!({
        "date": "2024-01-02",
        "mood": 8,
        "energy_level": 7,
        "stress_level": 2,
        "notes": "slept well"
    });
    let (status, _) = common::post_json(app.clone(), "/api/wellbeing", 6, &checkin).await;
    assert_eq!(status, StatusCode::CREATED);
    let meal = json!({
        "dish_name": "Salad",
        "proteins": 4.0,
        "fats": 9.5,
        "carbs": 12.0,
        "date": "2024-01-02"
    });
    let (status, _) = common::post_json(app.clone(), "/api/nutrition", 7, &meal).await;
    assert_eq!(status, StatusCode::CREATED);

    // Act
    let (status, summary) = common::get_json(app, "/api/dashboard/summary", Some(6)).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        summary,
        json!({ "sleep": 0, "nutrition": 0, "activity": 2, "wellbeing": 1, "total": 3 })
    );
}
