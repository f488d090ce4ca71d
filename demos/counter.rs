//! Counter Example
//!
//! A store with typed actions, a derived selector and a bridge, rendered
//! first as the server would and then as the client would.

use notifiers::prelude::*;

#[derive(Clone, Debug, PartialEq)]
struct CounterState {
    count: i32,
    step: i32,
}

struct CounterStore {
    notifier: Notifier<CounterState>,
}

impl CounterStore {
    fn new() -> Self {
        Self {
            notifier: Notifier::new(CounterState { count: 0, step: 1 }),
        }
    }

    fn hydrate(&self, state: CounterState) {
        self.notifier.set_server_state(state);
    }

    fn increment(&self) {
        self.notifier.update(|state| state.count += state.step);
    }

    fn set_step(&self, step: i32) {
        self.notifier.update(|state| state.step = step);
    }

    fn state(&self) -> ReadOnlyNotifier<CounterState> {
        self.notifier.read_only()
    }
}

fn render(label: &str, count: &Bridge<i32>, parity: &Selector<&'static str>, phase: RenderPhase) {
    let parity = match phase {
        RenderPhase::Client => parity.value(),
        _ => parity.server_value(),
    };
    println!("[{label}] count = {}, {}", count.snapshot_for(phase), parity);
}

fn main() {
    let store = CounterStore::new();
    store.hydrate(CounterState { count: 10, step: 1 });

    let state = store.state();
    let count = observe_with(&state, |state: &CounterState| state.count);
    let parity = Selector::new({
        let state = state.clone();
        move |get: &Getter| {
            if get.get(&state).count % 2 == 0 {
                "even"
            } else {
                "odd"
            }
        }
    });

    render("server", &count, &parity, RenderPhase::Server);
    render("hydrate", &count, &parity, RenderPhase::Hydrating);

    count.subscribe(|count| println!("  count changed to {count}"));
    parity.subscribe(|parity| println!("  parity changed to {parity}"));

    store.set_step(2);
    store.increment();
    store.increment();
    render("client", &count, &parity, RenderPhase::Client);

    store.set_step(1);
    store.increment();
    render("client", &count, &parity, RenderPhase::Client);
}
