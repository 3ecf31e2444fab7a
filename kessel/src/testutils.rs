//! In-memory stand-ins for the relations API and the RBAC directory.

use crate::relations::{LookupStream, RelationsError, RelationsTransport};
use crate::types::{
    Allowed, CheckRequest, CheckResponse, CreateTuplesRequest, LookupResourcesRequest,
    LookupResourcesResponse, ObjectReference,
};
use crate::workspace::{WorkspaceError, WorkspaceResolver};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// One frame of a scripted lookup stream.
#[derive(Clone, Debug)]
pub enum FakePage {
    Resource(String),
    Error { code: i32, message: String },
}

fn unavailable() -> RelationsError {
    RelationsError::Stream {
        code: 14,
        message: "unavailable".into(),
    }
}

/// Scripted relations transport that records every request it receives.
pub struct FakeRelationsTransport {
    allowed: Allowed,
    fail_checks: bool,
    lookup_pages: Vec<FakePage>,
    fail_create_call: Option<usize>,
    check_requests: Mutex<Vec<CheckRequest>>,
    lookup_requests: Mutex<Vec<LookupResourcesRequest>>,
    create_requests: Mutex<Vec<CreateTuplesRequest>>,
}

impl Default for FakeRelationsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRelationsTransport {
    pub fn new() -> Self {
        FakeRelationsTransport {
            allowed: Allowed::True,
            fail_checks: false,
            lookup_pages: Vec::new(),
            fail_create_call: None,
            check_requests: Mutex::new(Vec::new()),
            lookup_requests: Mutex::new(Vec::new()),
            create_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn allowing(mut self, allowed: Allowed) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn failing_checks(mut self) -> Self {
        self.fail_checks = true;
        self
    }

    pub fn with_lookup_pages(mut self, pages: Vec<FakePage>) -> Self {
        self.lookup_pages = pages;
        self
    }

    /// Fails the `n`th create call (0-based) and every call after it.
    pub fn failing_create_tuples_from(mut self, n: usize) -> Self {
        self.fail_create_call = Some(n);
        self
    }

    pub fn check_requests(&self) -> Vec<CheckRequest> {
        self.check_requests.lock().clone()
    }

    pub fn lookup_requests(&self) -> Vec<LookupResourcesRequest> {
        self.lookup_requests.lock().clone()
    }

    /// Create calls that were accepted, in order.
    pub fn create_requests(&self) -> Vec<CreateTuplesRequest> {
        self.create_requests.lock().clone()
    }
}

struct FakeLookupStream {
    pages: VecDeque<FakePage>,
    failed: bool,
}

#[async_trait]
impl LookupStream for FakeLookupStream {
    async fn next_page(&mut self) -> Result<Option<LookupResourcesResponse>, RelationsError> {
        if self.failed {
            return Ok(None);
        }

        match self.pages.pop_front() {
            Some(FakePage::Resource(id)) => Ok(Some(LookupResourcesResponse {
                resource: ObjectReference::new(
                    crate::permission::ResourceType::Integration.object_type(),
                    id,
                ),
                pagination: None,
            })),
            Some(FakePage::Error { code, message }) => {
                self.failed = true;
                Err(RelationsError::Stream { code, message })
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RelationsTransport for FakeRelationsTransport {
    async fn check(&self, request: CheckRequest) -> Result<CheckResponse, RelationsError> {
        self.check_requests.lock().push(request);
        if self.fail_checks {
            return Err(unavailable());
        }
        Ok(CheckResponse {
            allowed: self.allowed,
        })
    }

    async fn lookup_resources(
        &self,
        request: LookupResourcesRequest,
    ) -> Result<Box<dyn LookupStream>, RelationsError> {
        self.lookup_requests.lock().push(request);
        Ok(Box::new(FakeLookupStream {
            pages: self.lookup_pages.iter().cloned().collect(),
            failed: false,
        }))
    }

    async fn create_tuples(&self, request: CreateTuplesRequest) -> Result<(), RelationsError> {
        let mut accepted = self.create_requests.lock();
        if let Some(n) = self.fail_create_call {
            if accepted.len() >= n {
                return Err(unavailable());
            }
        }
        accepted.push(request);
        Ok(())
    }
}

/// Resolves organizations from a fixed map. Unknown organizations fail.
#[derive(Default)]
pub struct FakeWorkspaceResolver {
    workspaces: HashMap<String, Uuid>,
    calls: Mutex<Vec<String>>,
}

impl FakeWorkspaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, org_id: &str, workspace_id: Uuid) -> Self {
        self.workspaces.insert(org_id.to_string(), workspace_id);
        self
    }

    /// Organizations asked for, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl WorkspaceResolver for FakeWorkspaceResolver {
    async fn default_workspace_id(&self, org_id: &str) -> Result<Uuid, WorkspaceError> {
        self.calls.lock().push(org_id.to_string());
        self.workspaces
            .get(org_id)
            .copied()
            .ok_or_else(|| WorkspaceError::NotUnique {
                org_id: org_id.to_string(),
                count: 0,
            })
    }
}
