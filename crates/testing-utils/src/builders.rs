//! Test data builders
//!
//! Each builder starts from defaults that pass validation and exposes
//! `with_*` setters for the fields a test cares about.

use chrono::{DateTime, Duration, Utc};
use orchestrator_core::models::{
    EdgeCondition, InstanceRegistration, Inventory, Job, JobKind, JobSpec, JobStatus, JobTemplate,
    JobType, Project, StatusReason, WorkflowEdge, WorkflowJobTemplate, WorkflowNodeTemplate,
};

/// Builder for job templates (playbook kind by default)
pub struct JobTemplateBuilder {
    template: JobTemplate,
}

impl JobTemplateBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            template: JobTemplate::new(id, &format!("template-{id}"), JobKind::Playbook, JobType::Run),
        }
    }

    /// Cleanup system job template
    pub fn system_job(id: i64) -> Self {
        Self {
            template: JobTemplate::new(id, &format!("cleanup-{id}"), JobKind::SystemJob, JobType::Cleanup),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.template.name = name.to_string();
        self
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.template.job_type = job_type;
        self
    }

    pub fn with_project(mut self, project_id: i64) -> Self {
        self.template.project_id = Some(project_id);
        self
    }

    pub fn with_inventory(mut self, inventory_id: i64) -> Self {
        self.template.inventory_id = Some(inventory_id);
        self
    }

    pub fn with_credential(mut self, credential_id: i64) -> Self {
        self.template.credential_id = Some(credential_id);
        self
    }

    pub fn with_extra_vars(mut self, extra_vars: serde_json::Value) -> Self {
        self.template.extra_vars = extra_vars;
        self
    }

    pub fn allow_simultaneous(mut self, allow: bool) -> Self {
        self.template.allow_simultaneous = allow;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.template.priority = priority;
        self
    }

    pub fn with_task_impact(mut self, units: u32) -> Self {
        self.template.task_impact = units;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.template.timeout_seconds = timeout_seconds;
        self
    }

    pub fn build(self) -> JobTemplate {
        self.template
    }
}

/// Builder for projects; synced "now" unless told otherwise
pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    pub fn new(id: i64) -> Self {
        let mut project = Project::new(id, &format!("project-{id}"), "https://scm.example.org/repo.git");
        project.last_successful_sync = Some(Utc::now());
        Self { project }
    }

    pub fn never_synced(mut self) -> Self {
        self.project.last_successful_sync = None;
        self
    }

    pub fn synced_ago(mut self, ago: Duration) -> Self {
        self.project.last_successful_sync = Some(Utc::now() - ago);
        self
    }

    pub fn update_on_launch(mut self, enabled: bool) -> Self {
        self.project.update_on_launch = enabled;
        self
    }

    pub fn with_cache_timeout(mut self, seconds: i64) -> Self {
        self.project.cache_timeout_seconds = Some(seconds);
        self
    }

    /// Insights project scoped to an inventory
    pub fn with_inventory(mut self, inventory_id: i64) -> Self {
        self.project.inventory_id = Some(inventory_id);
        self
    }

    pub fn build(self) -> Project {
        self.project
    }
}

/// Builder for inventories; synced "now" unless told otherwise
pub struct InventoryBuilder {
    inventory: Inventory,
}

impl InventoryBuilder {
    pub fn new(id: i64) -> Self {
        let mut inventory = Inventory::new(id, &format!("inventory-{id}"));
        inventory.last_successful_sync = Some(Utc::now());
        Self { inventory }
    }

    pub fn never_synced(mut self) -> Self {
        self.inventory.last_successful_sync = None;
        self
    }

    pub fn synced_ago(mut self, ago: Duration) -> Self {
        self.inventory.last_successful_sync = Some(Utc::now() - ago);
        self
    }

    pub fn update_on_launch(mut self, enabled: bool) -> Self {
        self.inventory.update_on_launch = enabled;
        self
    }

    pub fn with_cache_timeout(mut self, seconds: i64) -> Self {
        self.inventory.cache_timeout_seconds = Some(seconds);
        self
    }

    /// SCM inventory source
    pub fn with_source_project(mut self, project_id: i64) -> Self {
        self.inventory.source_project_id = Some(project_id);
        self
    }

    pub fn build(self) -> Inventory {
        self.inventory
    }
}

/// Builder for workflow templates
pub struct WorkflowTemplateBuilder {
    template: WorkflowJobTemplate,
}

impl WorkflowTemplateBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            template: WorkflowJobTemplate {
                id,
                name: format!("workflow-{id}"),
                nodes: Vec::new(),
                edges: Vec::new(),
                allow_simultaneous: false,
                created_at: Utc::now(),
            },
        }
    }

    pub fn node(mut self, node_id: i64, job_template_id: i64) -> Self {
        self.template.nodes.push(WorkflowNodeTemplate {
            id: node_id,
            job_template_id,
        });
        self
    }

    pub fn edge(mut self, from: i64, to: i64, condition: EdgeCondition) -> Self {
        self.template.edges.push(WorkflowEdge {
            from,
            to,
            condition,
        });
        self
    }

    pub fn on_success(self, from: i64, to: i64) -> Self {
        self.edge(from, to, EdgeCondition::OnSuccess)
    }

    pub fn on_failure(self, from: i64, to: i64) -> Self {
        self.edge(from, to, EdgeCondition::OnFailure)
    }

    pub fn always(self, from: i64, to: i64) -> Self {
        self.edge(from, to, EdgeCondition::Always)
    }

    pub fn allow_simultaneous(mut self, allow: bool) -> Self {
        self.template.allow_simultaneous = allow;
        self
    }

    pub fn build(self) -> WorkflowJobTemplate {
        self.template
    }
}

/// Builder for instance registrations
pub struct InstanceRegistrationBuilder {
    registration: InstanceRegistration,
}

impl InstanceRegistrationBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            registration: InstanceRegistration {
                id: id.to_string(),
                hostname: format!("{id}.example.org"),
                capacity: None,
            },
        }
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.registration.hostname = hostname.to_string();
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.registration.capacity = Some(capacity);
        self
    }

    pub fn build(self) -> InstanceRegistration {
        self.registration
    }
}

/// Builder for jobs in an arbitrary initial state, for snapshot and recovery tests
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: i64) -> Self {
        let spec = JobSpec {
            kind: JobKind::Playbook,
            name: format!("job-{id}"),
            template_id: None,
            job_type: JobType::Run,
            project_id: None,
            inventory_id: None,
            credential_id: None,
            extra_vars: serde_json::json!({}),
            capacity_units: 1,
            priority: 0,
            timeout_seconds: 0,
            created_by: "admin".to_string(),
            workflow_job_id: None,
        };
        Self {
            job: Job::from_spec(id, spec, Utc::now()),
        }
    }

    pub fn sync(id: i64, kind: JobKind, target_id: i64) -> Self {
        let mut builder = Self::new(id);
        builder.job.kind = kind;
        match kind {
            JobKind::ProjectUpdate => builder.job.project_id = Some(target_id),
            _ => builder.job.inventory_id = Some(target_id),
        }
        builder
    }

    pub fn with_template(mut self, template_id: i64) -> Self {
        self.job.template_id = Some(template_id);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        if status == JobStatus::Running || status.is_terminal() {
            self.job.started_at.get_or_insert(self.job.created_at);
        }
        if status.is_terminal() {
            self.job.finished_at.get_or_insert(Utc::now());
        }
        self
    }

    pub fn with_reason(mut self, reason: StatusReason) -> Self {
        self.job.status_reason = Some(reason);
        self
    }

    /// Running on an instance with the given reservation
    pub fn running_on(mut self, instance_id: &str, units: u32) -> Self {
        self.job.instance_id = Some(instance_id.to_string());
        self.job.capacity_units = units;
        self.with_status(JobStatus::Running)
    }

    pub fn with_dependencies(mut self, dependencies: Vec<i64>) -> Self {
        self.job.dependencies = dependencies;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.job.created_at = created_at;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}
