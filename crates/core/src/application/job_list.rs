//! Job List - the authoritative ordered sequence of active jobs
//!
//! Reads take a shared lock, mutations an exclusive one. Every mutation is
//! computed on a working copy, handed to the persistence callback while the
//! write lock is held and only committed if persistence succeeded. Listeners
//! are notified after the lock is released, so persistence always observes a
//! mutation before anybody reacts to it.

use crate::domain::{
    DomainError, Job, JobClassification, JobData, JobId, JobObserver, JobPosition,
    ModifiedJobsFragment,
};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Receives notifications for all jobs registered in the list
pub trait JobListListener: Send + Sync {
    fn added(&self, jobs: &[Arc<JobData>]);

    fn progress_changed(&self, job: &Arc<JobData>);

    fn state_changed(
        &self,
        previous: JobClassification,
        current: JobClassification,
        job: &Arc<JobData>,
    );
}

/// Observer attached to every listed job, fans out to the list listeners
#[derive(Default)]
struct ListRelay {
    listeners: RwLock<Vec<Arc<dyn JobListListener>>>,
}

impl ListRelay {
    fn listeners(&self) -> Vec<Arc<dyn JobListListener>> {
        self.listeners.read().clone()
    }

    fn added(&self, jobs: &[Arc<JobData>]) {
        for listener in self.listeners() {
            listener.added(jobs);
        }
    }
}

impl JobObserver for ListRelay {
    fn progress_changed(&self, job: &Arc<JobData>) {
        for listener in self.listeners() {
            listener.progress_changed(job);
        }
    }

    fn state_changed(
        &self,
        previous: JobClassification,
        current: JobClassification,
        job: &Arc<JobData>,
    ) {
        for listener in self.listeners() {
            listener.state_changed(previous, current, job);
        }
    }
}

pub struct JobList {
    jobs: RwLock<Vec<Arc<JobData>>>,
    relay: Arc<ListRelay>,
}

impl Default for JobList {
    fn default() -> Self {
        Self::new()
    }
}

impl JobList {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            relay: Arc::new(ListRelay::default()),
        }
    }

    /// Register a listener for added jobs and job changes
    pub fn subscribe(&self, listener: Arc<dyn JobListListener>) {
        self.relay.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobData>> {
        self.jobs.read().iter().find(|job| job.id() == id).cloned()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.read().iter().any(|job| job.id() == id)
    }

    /// Job following `reference`, `None` for the tail or unlisted jobs
    pub fn next(&self, reference: &JobData) -> Option<Arc<JobData>> {
        let jobs = self.jobs.read();
        let index = index_of(&jobs, reference.id())?;
        jobs.get(index + 1).cloned()
    }

    /// Job preceding `reference`, `None` for the head or unlisted jobs
    pub fn previous(&self, reference: &JobData) -> Option<Arc<JobData>> {
        let jobs = self.jobs.read();
        let index = index_of(&jobs, reference.id())?;
        index.checked_sub(1).map(|i| Arc::clone(&jobs[i]))
    }

    /// `start` and every job after it, in list order
    pub fn forward_from(&self, start: &JobData) -> Vec<Arc<JobData>> {
        let jobs = self.jobs.read();
        match index_of(&jobs, start.id()) {
            Some(index) => jobs[index..].to_vec(),
            None => Vec::new(),
        }
    }

    /// `start` and every job before it, walking towards the head
    pub fn backward_from(&self, start: &JobData) -> Vec<Arc<JobData>> {
        let jobs = self.jobs.read();
        match index_of(&jobs, start.id()) {
            Some(index) => jobs[..=index].iter().rev().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<JobData>> {
        self.jobs.read().clone()
    }

    /// All jobs still classified `Idle`, in list order
    pub fn idle_jobs(&self) -> Vec<Arc<JobData>> {
        self.jobs
            .read()
            .iter()
            .filter(|job| job.classification() == JobClassification::Idle)
            .cloned()
            .collect()
    }

    /// Public shape of a job including its current navigation
    pub fn to_public(&self, job: &JobData) -> Job {
        let jobs = self.jobs.read();
        match index_of(&jobs, job.id()) {
            Some(index) => Job::from_data(
                job,
                index.checked_sub(1).map(|i| jobs[i].id()),
                jobs.get(index + 1).map(|next| next.id()),
            ),
            None => Job::from_data(job, None, None),
        }
    }

    /// Place `jobs` according to `position`.
    ///
    /// `persist` receives the affected slice before the change is committed;
    /// if it fails, the list stays untouched.
    pub fn add<F>(&self, jobs: Vec<Arc<JobData>>, position: JobPosition, persist: F) -> Result<()>
    where
        F: FnOnce(&ModifiedJobsFragment) -> Result<()>,
    {
        if jobs.is_empty() {
            return Ok(());
        }

        let inserted = {
            let mut guard = self.jobs.write();
            let mut working = guard.clone();

            let (fragment, inserted) = match position {
                JobPosition::AroundExisting => splice_around_existing(&mut working, &jobs)?,
                _ => {
                    ensure_unlisted(&working, &jobs)?;
                    let index = insertion_index(&working, position)?;
                    (insert_block(&mut working, index, &jobs), jobs)
                }
            };

            persist(&fragment)?;
            *guard = working;
            inserted
        };

        debug!(
            position = %position,
            inserted = inserted.len(),
            "Jobs added to job list"
        );

        for job in &inserted {
            job.attach(self.relay.clone());
        }
        if !inserted.is_empty() {
            self.relay.added(&inserted);
        }
        Ok(())
    }

    /// Remove a job. Removing a job that is no longer listed is a no-op.
    pub fn remove<F>(&self, job: &Arc<JobData>, persist: F) -> Result<()>
    where
        F: FnOnce(&ModifiedJobsFragment) -> Result<()>,
    {
        {
            let mut guard = self.jobs.write();
            let Some(index) = index_of(&guard, job.id()) else {
                warn!(job_id = job.id(), "Job to remove is not listed anymore");
                return Ok(());
            };

            let mut working = guard.clone();
            working.remove(index);
            let fragment = ModifiedJobsFragment {
                previous_id: index.checked_sub(1).map(|i| working[i].id()),
                jobs: working.get(index).cloned().into_iter().collect(),
            };

            persist(&fragment)?;
            *guard = working;
        }

        job.detach();
        debug!(job_id = job.id(), "Job removed from job list");
        Ok(())
    }

    /// Re-register jobs reconstructed from persisted state, in the given order
    pub fn restore<F>(&self, jobs: Vec<Arc<JobData>>, persist: F) -> Result<()>
    where
        F: FnOnce(&ModifiedJobsFragment) -> Result<()>,
    {
        if jobs.is_empty() {
            return Ok(());
        }

        {
            let mut guard = self.jobs.write();
            ensure_unlisted(&guard, &jobs)?;

            let mut working = guard.clone();
            let index = working.len();
            let fragment = insert_block(&mut working, index, &jobs);

            persist(&fragment)?;
            *guard = working;
        }

        for job in &jobs {
            job.attach(self.relay.clone());
        }
        debug!(restored = jobs.len(), "Jobs restored into job list");
        Ok(())
    }
}

fn index_of(jobs: &[Arc<JobData>], id: JobId) -> Option<usize> {
    jobs.iter().position(|job| job.id() == id)
}

fn ensure_unlisted(list: &[Arc<JobData>], jobs: &[Arc<JobData>]) -> Result<()> {
    let mut seen = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert(job.id()) || index_of(list, job.id()).is_some() {
            return Err(DomainError::ContractViolation(format!(
                "job {} is already part of the job list",
                job.id()
            ))
            .into());
        }
    }
    Ok(())
}

/// Index the new block starts at for every position except `AroundExisting`
fn insertion_index(list: &[Arc<JobData>], position: JobPosition) -> Result<usize> {
    let index = match position {
        JobPosition::Append => list.len(),
        JobPosition::Start => 0,
        JobPosition::BeforeOther(reference) => {
            let index = reference_index(list, reference)?;
            // Never wedge a job between a setup and the job it prepares
            match index.checked_sub(1) {
                Some(before) if list[before].is_prepare_of(&list[index]) => before,
                _ => index,
            }
        }
        JobPosition::AfterOther(reference) => {
            let index = reference_index(list, reference)? + 1;
            // Never wedge a job between a job and its cleanup
            match list.get(index) {
                Some(next) if next.is_cleanup_of(&list[index - 1]) => index + 1,
                _ => index,
            }
        }
        JobPosition::AppendToRecipe(recipe) => {
            let last = list
                .iter()
                .rposition(|job| job.recipe_id() == recipe)
                .ok_or_else(|| {
                    DomainError::ContractViolation(format!(
                        "no listed job uses recipe {recipe}"
                    ))
                })?;
            last + 1
        }
        JobPosition::AroundExisting => {
            return Err(DomainError::ContractViolation(
                "around-existing placement has no single insertion index".to_string(),
            )
            .into())
        }
    };
    Ok(index)
}

fn reference_index(list: &[Arc<JobData>], reference: JobId) -> Result<usize> {
    index_of(list, reference).ok_or_else(|| {
        error!(reference_id = reference, "Reference job of placement not found");
        DomainError::Corruption(format!("reference job {reference} is not listed")).into()
    })
}

fn insert_block(
    list: &mut Vec<Arc<JobData>>,
    index: usize,
    jobs: &[Arc<JobData>],
) -> ModifiedJobsFragment {
    let previous_id = index.checked_sub(1).map(|i| list[i].id());
    list.splice(index..index, jobs.iter().cloned());

    let mut affected = jobs.to_vec();
    if let Some(next) = list.get(index + jobs.len()) {
        affected.push(Arc::clone(next));
    }
    ModifiedJobsFragment {
        previous_id,
        jobs: affected,
    }
}

/// Splice `group` back into the list around its already listed jobs.
///
/// Starts at the first listed job of the group and walks outward in both
/// directions: listed neighbors must line up with the group, unlisted ones
/// are inserted. Any mismatch is a corruption.
fn splice_around_existing(
    list: &mut Vec<Arc<JobData>>,
    group: &[Arc<JobData>],
) -> Result<(ModifiedJobsFragment, Vec<Arc<JobData>>)> {
    let (anchor, anchor_index) = group
        .iter()
        .enumerate()
        .find_map(|(g, job)| index_of(list, job.id()).map(|l| (g, l)))
        .ok_or_else(|| {
            error!(group_size = group.len(), "No job of the group is listed");
            DomainError::Corruption("no job of the group is part of the job list".to_string())
        })?;

    let listed: HashSet<JobId> = group
        .iter()
        .filter(|job| index_of(list, job.id()).is_some())
        .map(|job| job.id())
        .collect();

    // Walk backward from the anchor
    let mut cursor = anchor_index;
    for job in group[..anchor].iter().rev() {
        match index_of(list, job.id()) {
            Some(index) if cursor > 0 && index == cursor - 1 => cursor = index,
            Some(index) => return Err(splice_mismatch(job, index, cursor)),
            None => list.insert(cursor, Arc::clone(job)),
        }
    }
    let start = cursor;

    // Walk forward from the anchor
    let mut cursor = start + anchor;
    for job in &group[anchor + 1..] {
        match index_of(list, job.id()) {
            Some(index) if index == cursor + 1 => cursor = index,
            Some(index) => return Err(splice_mismatch(job, index, cursor)),
            None => {
                cursor += 1;
                list.insert(cursor, Arc::clone(job));
            }
        }
    }

    let mut affected = list[start..=cursor].to_vec();
    let inserted = affected
        .iter()
        .filter(|job| !listed.contains(&job.id()))
        .cloned()
        .collect();
    if let Some(next) = list.get(cursor + 1) {
        affected.push(Arc::clone(next));
    }

    let fragment = ModifiedJobsFragment {
        previous_id: start.checked_sub(1).map(|i| list[i].id()),
        jobs: affected,
    };
    Ok((fragment, inserted))
}

fn splice_mismatch(job: &JobData, found: usize, cursor: usize) -> crate::error::AppError {
    error!(
        job_id = job.id(),
        found_at = found,
        expected_next_to = cursor,
        "Job group does not line up with the job list"
    );
    DomainError::Corruption(format!(
        "job {} is listed at {found} but the group expects it next to {cursor}",
        job.id()
    ))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Recipe;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn production(id: JobId, recipe: u32) -> Arc<JobData> {
        Arc::new(JobData::new(id, Arc::new(Recipe::production(recipe, "p")), 1))
    }

    fn setup(id: JobId, target: u32) -> Arc<JobData> {
        Arc::new(JobData::new(id, Arc::new(Recipe::setup(100 + target, "s", target)), 1))
    }

    fn cleanup(id: JobId, target: u32) -> Arc<JobData> {
        Arc::new(JobData::new(id, Arc::new(Recipe::cleanup(200 + target, "c", target)), 1))
    }

    fn ids(list: &JobList) -> Vec<JobId> {
        list.snapshot().iter().map(|job| job.id()).collect()
    }

    fn no_persist(_: &ModifiedJobsFragment) -> Result<()> {
        Ok(())
    }

    fn list_of(jobs: Vec<Arc<JobData>>) -> JobList {
        let list = JobList::new();
        list.add(jobs, JobPosition::Append, no_persist).unwrap();
        list
    }

    #[test]
    fn test_append_and_start() {
        let list = list_of(vec![production(1, 1), production(2, 1)]);
        list.add(vec![production(3, 2)], JobPosition::Start, no_persist)
            .unwrap();
        list.add(vec![production(4, 2)], JobPosition::Append, no_persist)
            .unwrap();

        assert_eq!(ids(&list), vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_before_other_keeps_neighbors() {
        let list = list_of(vec![production(1, 1), production(2, 2), production(3, 3)]);
        list.add(
            vec![production(10, 4), production(11, 4)],
            JobPosition::BeforeOther(2),
            no_persist,
        )
        .unwrap();

        assert_eq!(ids(&list), vec![1, 10, 11, 2, 3]);
        let reference = list.get(2).unwrap();
        assert_eq!(list.previous(&reference).unwrap().id(), 11);
        assert_eq!(list.next(&reference).unwrap().id(), 3);
    }

    #[test]
    fn test_before_other_does_not_split_setup() {
        let list = list_of(vec![production(1, 1), setup(2, 2), production(3, 2)]);
        list.add(vec![production(10, 5)], JobPosition::BeforeOther(3), no_persist)
            .unwrap();

        assert_eq!(ids(&list), vec![1, 10, 2, 3]);
    }

    #[test]
    fn test_after_other_does_not_split_cleanup() {
        let list = list_of(vec![production(1, 1), cleanup(2, 1), production(3, 2)]);
        list.add(vec![production(10, 5)], JobPosition::AfterOther(1), no_persist)
            .unwrap();

        assert_eq!(ids(&list), vec![1, 2, 10, 3]);
    }

    #[test]
    fn test_append_to_recipe() {
        let list = list_of(vec![production(1, 1), production(2, 2), production(3, 1), production(4, 3)]);
        list.add(vec![production(10, 1)], JobPosition::AppendToRecipe(1), no_persist)
            .unwrap();

        assert_eq!(ids(&list), vec![1, 2, 3, 10, 4]);

        let result = list.add(vec![production(11, 9)], JobPosition::AppendToRecipe(9), no_persist);
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::ContractViolation(_)))
        ));
    }

    #[test]
    fn test_unknown_reference_is_corruption() {
        let list = list_of(vec![production(1, 1)]);
        let result = list.add(vec![production(2, 1)], JobPosition::AfterOther(42), no_persist);

        assert!(matches!(result, Err(AppError::Domain(DomainError::Corruption(_)))));
        assert_eq!(ids(&list), vec![1]);
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let job = production(1, 1);
        let list = list_of(vec![job.clone()]);

        let result = list.add(vec![job], JobPosition::Append, no_persist);
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::ContractViolation(_)))
        ));
    }

    #[test]
    fn test_around_existing_inserts_new_neighbors() {
        let p1 = production(1, 1);
        let p2 = production(2, 1);
        let list = list_of(vec![production(0, 9), p1.clone(), p2.clone(), production(3, 9)]);

        let group = vec![setup(10, 1), p1, cleanup(11, 1), p2, cleanup(12, 1)];
        let mut fragment = None;
        list.add(group, JobPosition::AroundExisting, |f| {
            fragment = Some(f.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(ids(&list), vec![0, 10, 1, 11, 2, 12, 3]);

        let fragment = fragment.unwrap();
        assert_eq!(fragment.previous_id, Some(0));
        let affected: Vec<JobId> = fragment.jobs.iter().map(|job| job.id()).collect();
        assert_eq!(affected, vec![10, 1, 11, 2, 12, 3]);
    }

    #[test]
    fn test_around_existing_mismatch_is_corruption() {
        let p1 = production(1, 1);
        let p2 = production(2, 1);
        let list = list_of(vec![p1.clone(), production(5, 2), p2.clone()]);

        let result = list.add(vec![p1, setup(10, 1), p2], JobPosition::AroundExisting, no_persist);

        assert!(matches!(result, Err(AppError::Domain(DomainError::Corruption(_)))));
        assert_eq!(ids(&list), vec![1, 5, 2]);
    }

    #[test]
    fn test_around_existing_without_listed_job_is_corruption() {
        let list = list_of(vec![production(1, 1)]);
        let result = list.add(vec![production(2, 1)], JobPosition::AroundExisting, no_persist);

        assert!(matches!(result, Err(AppError::Domain(DomainError::Corruption(_)))));
    }

    #[test]
    fn test_failed_persistence_aborts_mutation() {
        let list = list_of(vec![production(1, 1)]);
        let result = list.add(vec![production(2, 1)], JobPosition::Append, |_| {
            Err(AppError::Persistence("disk full".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(ids(&list), vec![1]);
    }

    #[test]
    fn test_remove_missing_job_is_tolerated() {
        let job = production(1, 1);
        let list = list_of(vec![job.clone(), production(2, 1)]);

        let mut fragment = None;
        list.remove(&job, |f| {
            fragment = Some(f.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(ids(&list), vec![2]);
        assert!(!job.is_attached());

        let fragment = fragment.unwrap();
        assert_eq!(fragment.previous_id, None);
        assert_eq!(fragment.jobs[0].id(), 2);

        list.remove(&job, |_| panic!("must not persist")).unwrap();
    }

    #[test]
    fn test_traversal() {
        let list = list_of(vec![production(1, 1), production(2, 1), production(3, 1)]);
        let middle = list.get(2).unwrap();

        let forward: Vec<JobId> = list.forward_from(&middle).iter().map(|j| j.id()).collect();
        let backward: Vec<JobId> = list.backward_from(&middle).iter().map(|j| j.id()).collect();
        assert_eq!(forward, vec![2, 3]);
        assert_eq!(backward, vec![2, 1]);

        let public = list.to_public(&middle);
        assert_eq!(public.previous_id, Some(1));
        assert_eq!(public.next_id, Some(3));
    }

    struct PersistedFirst {
        persisted: Arc<AtomicBool>,
        violations: AtomicUsize,
        states: AtomicUsize,
    }

    impl JobListListener for PersistedFirst {
        fn added(&self, _jobs: &[Arc<JobData>]) {
            if !self.persisted.load(Ordering::SeqCst) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn progress_changed(&self, _job: &Arc<JobData>) {}

        fn state_changed(
            &self,
            _previous: JobClassification,
            _current: JobClassification,
            _job: &Arc<JobData>,
        ) {
            self.states.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_persist_before_notify() {
        let list = JobList::new();
        let persisted = Arc::new(AtomicBool::new(false));
        let listener = Arc::new(PersistedFirst {
            persisted: persisted.clone(),
            violations: AtomicUsize::new(0),
            states: AtomicUsize::new(0),
        });
        list.subscribe(listener.clone());

        let job = production(1, 1);
        list.add(vec![job.clone()], JobPosition::Append, |_| {
            persisted.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        assert_eq!(listener.violations.load(Ordering::SeqCst), 0);

        job.set_classification(JobClassification::Waiting);
        assert_eq!(listener.states.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_restore_keeps_order_without_added_notification() {
        let list = JobList::new();
        let persisted = Arc::new(AtomicBool::new(false));
        let listener = Arc::new(PersistedFirst {
            persisted,
            violations: AtomicUsize::new(0),
            states: AtomicUsize::new(0),
        });
        list.subscribe(listener.clone());

        list.restore(vec![production(3, 1), production(1, 1)], no_persist)
            .unwrap();

        assert_eq!(ids(&list), vec![3, 1]);
        assert_eq!(listener.violations.load(Ordering::SeqCst), 0);
        assert!(list.get(3).unwrap().is_attached());
    }
}
