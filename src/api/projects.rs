use reqwest::Method;

use super::models::{Project, ProjectQuery};
use super::ApiClient;
use crate::Result;

impl ApiClient {
    pub async fn project_count(&self) -> Result<u64> {
        self.get("/projects/num").await
    }

    pub async fn projects(&self, query: &ProjectQuery) -> Result<Vec<Project>> {
        self.get_query("/projects", query).await
    }

    pub async fn add_project(&self, project: &serde_json::Value) -> Result<()> {
        let builder = self.request(Method::POST, "/projects")?.json(project);
        self.execute(builder).await
    }

    pub async fn delete_project(&self, id: i64) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("/projects/{}", id))?;
        self.execute(builder).await
    }
}
