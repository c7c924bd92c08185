//! AWS Batch-backed [`JobQueue`].

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_batch::Client;
use aws_sdk_batch::types::{
    JobDetail as SdkJobDetail, JobStatus as SdkJobStatus, JobSummary as SdkJobSummary,
};

use super::{Present, map_sdk_error};
use crate::error::{Error, Result};
use crate::id::JobId;
use crate::jobs::{
    ContainerDetail, DESCRIBE_BATCH_LIMIT, JobDetail, JobFilter, JobPage, JobQueue, JobStatus,
    JobSummary, ListJobsRequest,
};

const SERVICE: &str = "job-queue";

/// Job queue over AWS Batch.
#[derive(Debug, Clone)]
pub struct BatchJobQueue {
    client: Client,
}

impl BatchJobQueue {
    /// Creates a queue client from shared SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobQueue for BatchJobQueue {
    async fn list_jobs(&self, request: &ListJobsRequest) -> Result<JobPage> {
        let builder = self
            .client
            .list_jobs()
            .job_status(SdkJobStatus::from(request.status.as_str()))
            .set_next_token(request.next_token.clone());
        let builder = match &request.filter {
            JobFilter::Queue(queue) => builder.job_queue(queue),
            JobFilter::ArrayParent(parent) => builder.array_job_id(parent.as_str()),
        };
        let output = builder
            .send()
            .await
            .map_err(|e| map_sdk_error(SERVICE, "list_jobs", &e))?;

        let summaries = output
            .job_summary_list()
            .iter()
            .map(summary_from_sdk)
            .collect::<Result<Vec<_>>>()?;
        Ok(JobPage {
            summaries,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn describe_jobs(&self, ids: &[JobId]) -> Result<Vec<JobDetail>> {
        if ids.len() > DESCRIBE_BATCH_LIMIT {
            return Err(Error::InvalidInput(format!(
                "describe_jobs accepts at most {DESCRIBE_BATCH_LIMIT} ids, got {}",
                ids.len()
            )));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .client
            .describe_jobs()
            .set_jobs(Some(ids.iter().map(ToString::to_string).collect()))
            .send()
            .await
            .map_err(|e| map_sdk_error(SERVICE, "describe_jobs", &e))?;

        output.jobs().iter().map(detail_from_sdk).collect()
    }
}

fn status_from_sdk(job_id: &str, status: Option<&SdkJobStatus>) -> Result<JobStatus> {
    let status =
        status.ok_or_else(|| Error::malformed_job(job_id, "job description has no status"))?;
    status.as_str().parse()
}

fn summary_from_sdk(summary: &SdkJobSummary) -> Result<JobSummary> {
    let job_id = summary
        .job_id()
        .present()
        .ok_or_else(|| Error::collaborator(SERVICE, "job summary without a job id"))?;
    Ok(JobSummary {
        job_id: JobId::new(job_id)?,
        job_name: summary.job_name().present().unwrap_or_default().to_string(),
        status: status_from_sdk(job_id, summary.status().present())?,
        array_index: summary
            .array_properties()
            .and_then(|props| props.index())
            .and_then(|index| u32::try_from(index).ok()),
    })
}

fn detail_from_sdk(detail: &SdkJobDetail) -> Result<JobDetail> {
    let job_id = detail
        .job_id()
        .present()
        .ok_or_else(|| Error::collaborator(SERVICE, "job description without a job id"))?;
    let array = detail.array_properties();
    let container = detail.container().map(|container| ContainerDetail {
        environment: container
            .environment()
            .iter()
            .filter_map(|kv| Some((kv.name()?.to_string(), kv.value()?.to_string())))
            .collect(),
        log_stream_name: container.log_stream_name().map(str::to_string),
    });

    Ok(JobDetail {
        job_id: JobId::new(job_id)?,
        job_name: detail.job_name().present().unwrap_or_default().to_string(),
        status: status_from_sdk(job_id, detail.status().present())?,
        array_size: array
            .and_then(|props| props.size())
            .and_then(|size| u32::try_from(size).ok()),
        array_index: array
            .and_then(|props| props.index())
            .and_then(|index| u32::try_from(index).ok()),
        container,
    })
}
