//! Read-only queries over the `students` table.

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;

use super::entities::student;
use super::error::DatabaseError;
use crate::categorizer::DepartmentMatch;

/// A student who receives the circular.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

/// Source of departments and recipients. Queried fresh on every request.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Distinct department names, sorted ascending.
    async fn departments(&self) -> Result<Vec<String>, DatabaseError>;

    /// Students of the matched department, or every student for
    /// [`DepartmentMatch::All`]. Duplicate addresses are kept. Only `name`,
    /// `email` and `department` are read; row order is unspecified.
    async fn recipients(&self, target: &DepartmentMatch) -> Result<Vec<Recipient>, DatabaseError>;
}

#[derive(Clone)]
pub struct SeaOrmStudentDirectory {
    db: DatabaseConnection,
}

impl SeaOrmStudentDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl StudentDirectory for SeaOrmStudentDirectory {
    async fn departments(&self) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<Option<String>> = student::Entity::find()
            .select_only()
            .column(student::Column::Department)
            .distinct()
            .filter(student::Column::Department.is_not_null())
            .order_by_asc(student::Column::Department)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().flatten().collect())
    }

    async fn recipients(&self, target: &DepartmentMatch) -> Result<Vec<Recipient>, DatabaseError> {
        let mut query = student::Entity::find()
            .select_only()
            .column(student::Column::Name)
            .column(student::Column::Email);

        if let DepartmentMatch::Department(name) = target {
            query = query.filter(student::Column::Department.eq(name.as_str()));
        }

        let recipients = query.into_model::<Recipient>().all(&self.db).await?;
        log::debug!("Found {} recipients for {}", recipients.len(), target);
        Ok(recipients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ActiveModelTrait, Set};

    async fn directory(rows: &[(&str, &str, Option<&str>)]) -> SeaOrmStudentDirectory {
        let db = crate::db::connect("sqlite::memory:", true).await.unwrap();
        for (name, email, department) in rows {
            student::ActiveModel {
                name: Set(name.to_string()),
                email: Set(email.to_string()),
                department: Set(department.map(String::from)),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();
        }
        SeaOrmStudentDirectory::new(db)
    }

    fn roster() -> Vec<(&'static str, &'static str, Option<&'static str>)> {
        vec![
            ("Asha", "asha@univ.edu", Some("ECE")),
            ("Ben", "ben@univ.edu", Some("CS")),
            ("Chen", "chen@univ.edu", Some("CS")),
            ("Dara", "dara@univ.edu", None),
            ("Ben", "ben@univ.edu", Some("CS")),
        ]
    }

    #[tokio::test]
    async fn test_departments_are_distinct_and_sorted() {
        let directory = directory(&roster()).await;
        assert_eq!(
            directory.departments().await.unwrap(),
            vec!["CS".to_string(), "ECE".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_table_has_no_departments() {
        let directory = directory(&[]).await;
        assert!(directory.departments().await.unwrap().is_empty());
    }

    fn sorted_emails(recipients: &[Recipient]) -> Vec<&str> {
        let mut emails: Vec<&str> = recipients.iter().map(|r| r.email.as_str()).collect();
        emails.sort();
        emails
    }

    #[tokio::test]
    async fn test_recipients_for_department() {
        let directory = directory(&roster()).await;
        let recipients = directory
            .recipients(&DepartmentMatch::Department("CS".to_string()))
            .await
            .unwrap();

        // Duplicate rows are not collapsed.
        assert_eq!(
            sorted_emails(&recipients),
            vec!["ben@univ.edu", "ben@univ.edu", "chen@univ.edu"]
        );
    }

    #[tokio::test]
    async fn test_recipients_for_all() {
        let directory = directory(&roster()).await;
        let recipients = directory.recipients(&DepartmentMatch::All).await.unwrap();
        assert_eq!(recipients.len(), 5);
        assert!(recipients.contains(&Recipient {
            name: "Dara".to_string(),
            email: "dara@univ.edu".to_string()
        }));
    }

    #[tokio::test]
    async fn test_table_without_id_column() {
        use sea_orm::ConnectionTrait;

        let db = crate::db::connect("sqlite::memory:", false).await.unwrap();
        db.execute_unprepared(
            "CREATE TABLE students (name TEXT NOT NULL, email TEXT NOT NULL, department TEXT)",
        )
        .await
        .unwrap();
        db.execute_unprepared(
            "INSERT INTO students (name, email, department) VALUES
                ('Ben', 'ben@univ.edu', 'CS'),
                ('Asha', 'asha@univ.edu', 'ECE'),
                ('Dara', 'dara@univ.edu', NULL)",
        )
        .await
        .unwrap();
        let directory = SeaOrmStudentDirectory::new(db);

        assert_eq!(
            directory.departments().await.unwrap(),
            vec!["CS".to_string(), "ECE".to_string()]
        );
        let all = directory.recipients(&DepartmentMatch::All).await.unwrap();
        assert_eq!(
            sorted_emails(&all),
            vec!["asha@univ.edu", "ben@univ.edu", "dara@univ.edu"]
        );
        let cs = directory
            .recipients(&DepartmentMatch::Department("CS".to_string()))
            .await
            .unwrap();
        assert_eq!(sorted_emails(&cs), vec!["ben@univ.edu"]);
    }

    #[tokio::test]
    async fn test_department_match_is_exact() {
        let directory = directory(&roster()).await;
        let recipients = directory
            .recipients(&DepartmentMatch::Department("cs".to_string()))
            .await
            .unwrap();
        assert!(recipients.is_empty());
    }
}
