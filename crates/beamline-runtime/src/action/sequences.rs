//! Builders for the five concrete Actions' command/wait expansions
//! (§4.2.1–4.2.5). Each function only builds the `Vec<Step>`; the
//! scheduler interaction (pause, enqueue, restore, track) is
//! [`super::Action::initialize`]'s job.

use beamline_core::{CmdId, Command, Kwargs, Value};

use super::Step;
use crate::scheduler::Scheduler;

fn barrier_cmd(token: String, peers: &[&str]) -> Command {
    let mut kwargs = Kwargs::new();
    kwargs.insert("condition".to_string(), Value::Str("status".to_string()));
    kwargs.insert(
        "inst_conds".to_string(),
        Value::InstConds(peers.iter().map(|p| (p.to_string(), vec![token.clone()])).collect()),
    );
    Command { cmd_id: CmdId::new(0), cmd: token, args: Vec::new(), kwargs }
}

fn check_cmd(token: String, peers: &[&str]) -> Command {
    let mut kwargs = Kwargs::new();
    kwargs.insert("condition".to_string(), Value::Str("check".to_string()));
    kwargs.insert(
        "inst_conds".to_string(),
        Value::InstConds(peers.iter().map(|p| (p.to_string(), vec![token.clone()])).collect()),
    );
    Command { cmd_id: CmdId::new(0), cmd: token, args: Vec::new(), kwargs }
}

fn plain_cmd(cmd: impl Into<String>, kwargs: Kwargs) -> Command {
    Command { cmd_id: CmdId::new(0), cmd: cmd.into(), args: Vec::new(), kwargs }
}

fn samples_running_kwargs(running: bool) -> Kwargs {
    Kwargs::from([("running".to_string(), Value::Bool(running))])
}

fn three_way_barrier(token: &str, a: &str, b: &str, c: &str) -> Vec<Step> {
    vec![
        (a.to_string(), barrier_cmd(token.to_string(), &[b, c])),
        (b.to_string(), barrier_cmd(token.to_string(), &[a, c])),
        (c.to_string(), barrier_cmd(token.to_string(), &[a, b])),
    ]
}

/// A barrier across an arbitrary number of controls: every control waits
/// on every other one under the same token.
fn n_way_barrier(token: &str, controls: &[&str]) -> Vec<Step> {
    controls
        .iter()
        .map(|&p| {
            let peers: Vec<&str> = controls.iter().copied().filter(|&x| x != p).collect();
            (p.to_string(), barrier_cmd(token.to_string(), &peers))
        })
        .collect()
}

fn three_way_check(token: &str, a: &str, b: &str, c: &str) -> Vec<Step> {
    vec![
        (a.to_string(), check_cmd(token.to_string(), &[b, c])),
        (b.to_string(), check_cmd(token.to_string(), &[a, c])),
        (c.to_string(), check_cmd(token.to_string(), &[a, b])),
    ]
}

/// Kwargs the caller hands in verbatim to the relevant `dispatch()` call;
/// this module only sequences *when* each fires, never what it contains.
pub struct SampleParams {
    pub exposure_kwargs: Kwargs,
    pub inject_kwargs: Kwargs,
    pub stop_flow_after: bool,
    pub coflow_rate: f64,
    pub coflow_was_stopped: bool,
    pub stop_coflow_after: bool,
}

/// §4.2.1 — Run SEC sample: the HPLC pump itself performs the injection.
pub fn sec_sample_steps(scheduler: &Scheduler, exposure: &str, hplc: &str, coflow: &str, params: SampleParams) -> Vec<Step> {
    let start_token = format!("wait_sync_{}", scheduler.next_wait_id().get());
    let check_token = format!("wait_check_{}", scheduler.next_wait_id().get());
    let finish_token = format!("wait_sync_{}", scheduler.next_wait_id().get());

    let mut steps = three_way_barrier(&start_token, exposure, hplc, coflow);
    steps.extend(three_way_check(&check_token, exposure, hplc, coflow));

    steps.push((exposure.to_string(), plain_cmd("expose", params.exposure_kwargs)));
    steps.push((hplc.to_string(), plain_cmd("set_samples_running", samples_running_kwargs(true))));
    steps.push((hplc.to_string(), plain_cmd("inject", params.inject_kwargs)));
    if params.stop_flow_after {
        steps.push((hplc.to_string(), plain_cmd("stop_flow", Kwargs::new())));
    }
    steps.push((hplc.to_string(), plain_cmd("set_samples_running", samples_running_kwargs(false))));
    let coflow_cmd = if params.coflow_was_stopped { "start" } else { "change_flow" };
    steps.push((coflow.to_string(), plain_cmd(coflow_cmd, Kwargs::from([("rate".to_string(), Value::Float(params.coflow_rate))]))));

    steps.extend(three_way_barrier(&finish_token, exposure, hplc, coflow));

    if params.stop_coflow_after {
        let stop_token = format!("wait_sync_{}", scheduler.next_wait_id().get());
        steps.push((coflow.to_string(), plain_cmd("stop", Kwargs::new())));
        steps.extend(three_way_barrier(&stop_token, coflow, hplc, exposure));
    }
    steps
}

/// Kwargs for the autosampler-driven batch sample path.
pub struct BatchParams {
    pub exposure_kwargs: Kwargs,
    pub load_kwargs: Kwargs,
    pub inject_kwargs: Kwargs,
    pub coflow_rate: f64,
    pub coflow_was_stopped: bool,
    pub stop_coflow_after: bool,
}

/// §4.2.2 — Run batch sample: same barrier sandwich as SEC, but the
/// autosampler injects, gated by an inner rendezvous on the exposure
/// controller reaching its commanded state before `inject` fires
/// (supplemented from `BatchSampleCommand._initialize_cmd`). The
/// samples-running gate still lives on the HPLC driver even though the
/// autosampler performs the injection, so `hplc` brackets it.
pub fn batch_sample_steps(scheduler: &Scheduler, exposure: &str, autosampler: &str, hplc: &str, coflow: &str, params: BatchParams) -> Vec<Step> {
    let start_token = format!("wait_sync_{}", scheduler.next_wait_id().get());
    let check_token = format!("wait_check_{}", scheduler.next_wait_id().get());
    let batch_token = format!("wait_sync_{}", scheduler.next_wait_id().get());
    let finish_token = format!("wait_sync_{}", scheduler.next_wait_id().get());

    let mut steps = three_way_barrier(&start_token, exposure, autosampler, coflow);
    steps.extend(three_way_check(&check_token, exposure, autosampler, coflow));

    steps.push((exposure.to_string(), plain_cmd("expose", params.exposure_kwargs)));
    steps.push((autosampler.to_string(), plain_cmd("load_and_move_to_inject", params.load_kwargs)));

    // Inner rendezvous: the autosampler only injects once the exposure
    // controller has also reached this point (i.e. is actually exposing).
    steps.push((autosampler.to_string(), barrier_cmd(batch_token.clone(), &[exposure])));
    steps.push((exposure.to_string(), barrier_cmd(batch_token, &[autosampler])));

    steps.push((hplc.to_string(), plain_cmd("set_samples_running", samples_running_kwargs(true))));
    steps.push((autosampler.to_string(), plain_cmd("inject", params.inject_kwargs)));
    steps.push((hplc.to_string(), plain_cmd("set_samples_running", samples_running_kwargs(false))));
    let coflow_cmd = if params.coflow_was_stopped { "start" } else { "change_flow" };
    steps.push((coflow.to_string(), plain_cmd(coflow_cmd, Kwargs::from([("rate".to_string(), Value::Float(params.coflow_rate))]))));

    steps.extend(three_way_barrier(&finish_token, exposure, autosampler, coflow));

    if params.stop_coflow_after {
        let stop_token = format!("wait_sync_{}", scheduler.next_wait_id().get());
        steps.push((coflow.to_string(), plain_cmd("stop", Kwargs::new())));
        steps.extend(three_way_barrier(&stop_token, coflow, autosampler, exposure));
    }
    steps
}

pub struct EquilibrateParams {
    pub buffer_position: String,
    pub equilibrate_kwargs: Kwargs,
    /// `false` on a two-flow-path system, so the other path may keep
    /// running samples during this equilibration.
    pub include_exposure: bool,
    pub include_coflow: bool,
}

/// §4.2.3 — Equilibrate column for a single flow path.
pub fn equilibrate_steps(scheduler: &Scheduler, hplc: &str, coflow: &str, exposure: &str, params: EquilibrateParams) -> Vec<Step> {
    let mut participants = vec![hplc];
    if params.include_coflow {
        participants.push(coflow);
    }
    if params.include_exposure {
        participants.push(exposure);
    }

    let start_token = format!("wait_sync_{}", scheduler.next_wait_id().get());
    let finish_token = format!("wait_sync_{}", scheduler.next_wait_id().get());

    let mut steps = n_way_barrier(&start_token, &participants);

    steps.push((
        hplc.to_string(),
        plain_cmd("select_buffer", Kwargs::from([("position".to_string(), Value::Str(params.buffer_position))])),
    ));
    steps.push((hplc.to_string(), plain_cmd("equilibrate", params.equilibrate_kwargs)));

    steps.extend(n_way_barrier(&finish_token, &participants));
    steps
}

/// Per-pump parameters for a path switch (§4.3.3 steps 3 and 7): whether
/// this pump stops to zero before the valves move, and the rate it gets
/// restored to afterward if `restore_after_switch` is set.
pub struct PumpSwitch {
    pub control: String,
    pub stop_flow: bool,
    pub restore_rate: f64,
}

pub struct SwitchParams {
    /// The pump becoming the new active path.
    pub new_active: String,
    pub pumps: Vec<PumpSwitch>,
    pub switch_with_sample: bool,
    /// How long the simulated valve drive takes to land, passed straight
    /// through to the new-active pump's `switch_pumps` dispatch.
    pub valve_drive_secs: f64,
    /// `true` launches §4.3.1 on the new path once the valve lands (step
    /// 6); `purge_kwargs` carries its rate/volume/accel/restore params.
    pub purge_active: bool,
    pub purge_kwargs: Kwargs,
    /// Restore every pump to its snapshot rate once the switch settles
    /// (step 7). The new-active pump's own restore is folded into the
    /// driver's switch/purge handoff; every other pump is restored here
    /// via a plain `set_flow_rate` step.
    pub restore_after_switch: bool,
    /// `Some(kwargs)` equilibrates coflow in-line during the switch.
    pub equilibrate_coflow: Option<Kwargs>,
}

/// §4.2.4 / §4.3.3 — Switch active flow path on a dual-path HPLC.
///
/// Stops whichever pumps are flagged and barriers every pump on that
/// before the valve-drive command fires (step 3-4), so a still-ramping
/// pump can never be caught mid-valve-move. The new-active pump's own
/// `switch_pumps` dispatch owns the valve drive and, lazily, the
/// optional purge/restore that follow it; reassigning the autosampler's
/// linked pump (step 5) and restoring every other pump's rate (step 7)
/// are separate steps here since a single driver instance only speaks
/// for its own flow path.
pub fn switch_pumps_steps(scheduler: &Scheduler, autosampler: &str, coflow: &str, params: SwitchParams) -> Vec<Step> {
    let pump_controls: Vec<&str> = params.pumps.iter().map(|p| p.control.as_str()).collect();

    let stop_token = format!("wait_sync_{}", scheduler.next_wait_id().get());
    let finish_token = format!("wait_sync_{}", scheduler.next_wait_id().get());

    let mut steps = Vec::new();
    for p in &params.pumps {
        if p.stop_flow {
            steps.push((p.control.clone(), plain_cmd("stop_flow", Kwargs::new())));
        }
    }
    steps.extend(n_way_barrier(&stop_token, &pump_controls));

    let mut switch_kwargs = params.purge_kwargs.clone();
    switch_kwargs.insert("switchWithSample".to_string(), Value::Bool(params.switch_with_sample));
    switch_kwargs.insert("purgeActive".to_string(), Value::Bool(params.purge_active));
    switch_kwargs.insert("restoreFlowAfterSwitch".to_string(), Value::Bool(params.restore_after_switch));
    switch_kwargs.insert("valveDriveSecs".to_string(), Value::Float(params.valve_drive_secs));
    if params.restore_after_switch && !params.purge_active {
        if let Some(new_active) = params.pumps.iter().find(|p| p.control == params.new_active) {
            switch_kwargs.insert("restoreRate".to_string(), Value::Float(new_active.restore_rate));
        }
    }
    steps.push((params.new_active.clone(), plain_cmd("switch_pumps", switch_kwargs)));

    steps.push((autosampler.to_string(), plain_cmd("link_pump", Kwargs::from([("pump".to_string(), Value::Str(params.new_active.clone()))]))));

    if params.restore_after_switch {
        for p in &params.pumps {
            if p.control != params.new_active {
                steps.push((p.control.clone(), plain_cmd("set_flow_rate", Kwargs::from([("rate".to_string(), Value::Float(p.restore_rate))]))));
            }
        }
    }

    if let Some(eq_kwargs) = params.equilibrate_coflow {
        steps.push((coflow.to_string(), plain_cmd("equilibrate", eq_kwargs)));
    }

    steps.extend(n_way_barrier(&finish_token, &pump_controls));
    steps
}

/// §4.2.5 — Stop flow: minimal, no barrier.
pub fn stop_flow_steps(hplc: &str) -> Vec<Step> {
    vec![(hplc.to_string(), plain_cmd("stop_flow", Kwargs::new()))]
}

/// §4.2.5 — Standalone exposure: minimal, no barrier.
pub fn exposure_steps(exposure: &str, expose_kwargs: Kwargs) -> Vec<Step> {
    vec![(exposure.to_string(), plain_cmd("expose", expose_kwargs))]
}
