// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enum registry: the frozen vocabulary shared by the wire protocol,
//! the CLI, and the logs.
//!
//! Every enum maps both ways: `Display` renders the stable lowercase name,
//! `from_name` parses it back, and the `u32` conversions carry the frozen
//! wire numbering (declaration order). Unknown inputs yield `None` rather
//! than aborting.

use serde::{Deserialize, Serialize};

/// Desired terminal condition for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Stop,
    Start,
}

crate::simple_display! {
    Goal {
        Stop => "stop",
        Start => "start",
    }
}

impl Goal {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stop" => Some(Goal::Stop),
            "start" => Some(Goal::Start),
            _ => None,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Goal::Stop),
            1 => Some(Goal::Start),
            _ => None,
        }
    }
}

/// Where a job currently is in its lifecycle.
///
/// Combined with the goal to decide what to do with the processes and which
/// state to move into when a change in process state (pid obtained or death)
/// occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Starting,
    PreStart,
    Spawned,
    PostStart,
    Running,
    PreStop,
    Stopping,
    Killed,
    PostStop,
    Deleted,
}

crate::simple_display! {
    JobState {
        Waiting => "waiting",
        Starting => "starting",
        PreStart => "pre-start",
        Spawned => "spawned",
        PostStart => "post-start",
        Running => "running",
        PreStop => "pre-stop",
        Stopping => "stopping",
        Killed => "killed",
        PostStop => "post-stop",
        Deleted => "deleted",
    }
}

impl JobState {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "waiting" => Some(JobState::Waiting),
            "starting" => Some(JobState::Starting),
            "pre-start" => Some(JobState::PreStart),
            "spawned" => Some(JobState::Spawned),
            "post-start" => Some(JobState::PostStart),
            "running" => Some(JobState::Running),
            "pre-stop" => Some(JobState::PreStop),
            "stopping" => Some(JobState::Stopping),
            "killed" => Some(JobState::Killed),
            "post-stop" => Some(JobState::PostStop),
            "deleted" => Some(JobState::Deleted),
            _ => None,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        use JobState::*;
        [
            Waiting, Starting, PreStart, Spawned, PostStart, Running, PreStop, Stopping, Killed,
            PostStop, Deleted,
        ]
        .get(value as usize)
        .copied()
    }
}

/// Lifecycle of the single currently tracked child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    None,
    Spawned,
    Active,
    Killed,
}

crate::simple_display! {
    ProcessState {
        None => "none",
        Spawned => "spawned",
        Active => "active",
        Killed => "killed",
    }
}

impl ProcessState {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(ProcessState::None),
            "spawned" => Some(ProcessState::Spawned),
            "active" => Some(ProcessState::Active),
            "killed" => Some(ProcessState::Killed),
            _ => None,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        use ProcessState::*;
        [None, Spawned, Active, Killed].get(value as usize).copied()
    }
}

/// The five built-in actions a job may define, in spawn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Main,
    PreStart,
    PostStart,
    PreStop,
    PostStop,
}

crate::simple_display! {
    ProcessKind {
        Main => "main",
        PreStart => "pre-start",
        PostStart => "post-start",
        PreStop => "pre-stop",
        PostStop => "post-stop",
    }
}

impl ProcessKind {
    pub const ALL: [ProcessKind; 5] = [
        ProcessKind::Main,
        ProcessKind::PreStart,
        ProcessKind::PostStart,
        ProcessKind::PreStop,
        ProcessKind::PostStop,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "main" => Some(ProcessKind::Main),
            "pre-start" => Some(ProcessKind::PreStart),
            "post-start" => Some(ProcessKind::PostStart),
            "pre-stop" => Some(ProcessKind::PreStop),
            "post-stop" => Some(ProcessKind::PostStop),
            _ => None,
        }
    }
}

/// How a job's children get their standard file descriptors arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleType {
    #[default]
    Logged,
    Output,
    Owner,
    None,
}

crate::simple_display! {
    ConsoleType {
        Logged => "logged",
        Output => "output",
        Owner => "owner",
        None => "none",
    }
}

impl ConsoleType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "logged" => Some(ConsoleType::Logged),
            "output" => Some(ConsoleType::Output),
            "owner" => Some(ConsoleType::Owner),
            "none" => Some(ConsoleType::None),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "enums_tests.rs"]
mod tests;
