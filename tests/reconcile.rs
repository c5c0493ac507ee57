use lignin_fiber::{CommitReport, Component, EffectPhase, ElementDescriptor, EngineConfig, EngineError, Key, Lane, Mutation, NodeId, RootId, Scheduler, SliceBudget};
use std::{cell::Cell, rc::Rc};

mod recording_host_;
use recording_host_::{init_log, Op, RecordingHost};

fn scheduler() -> (Scheduler<RecordingHost>, RootId) {
	init_log();
	let mut scheduler = Scheduler::new(RecordingHost::new(), EngineConfig::default().with_slice(SliceBudget::Unbounded));
	let root = scheduler.create_root(RecordingHost::CONTAINER);
	(scheduler, root)
}

fn render(scheduler: &mut Scheduler<RecordingHost>, root: RootId, element: Option<ElementDescriptor>) -> CommitReport {
	scheduler.schedule_update(root, element, Lane::Default).unwrap();
	let mut reports = scheduler.run_until_idle().unwrap();
	assert_eq!(reports.len(), 1);
	reports.pop().unwrap()
}

fn text(tag: &str, text: &str) -> ElementDescriptor {
	ElementDescriptor::host(tag).child(ElementDescriptor::text(text))
}

fn li(key: &str, content: &str) -> ElementDescriptor {
	text("li", content).key(key)
}

fn ul(items: impl IntoIterator<Item = ElementDescriptor>) -> ElementDescriptor {
	ElementDescriptor::host("ul").children(items)
}

/// Children of the first node below the root.
fn top_children(scheduler: &Scheduler<RecordingHost>, root: RootId) -> Vec<NodeId> {
	let tree = scheduler.tree(root).unwrap();
	tree.children(tree.children(NodeId::ROOT)[0]).to_vec()
}

#[test]
fn one_leaf_text_change_is_one_update() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ElementDescriptor::host("div").children([text("p", "a"), text("p", "b")])));
	scheduler.host_mut().take_ops();

	let report = render(&mut scheduler, root, Some(ElementDescriptor::host("div").children([text("p", "a"), text("p", "c")])));

	assert_eq!(report.mutations.len(), 1);
	match &report.mutations[0] {
		Mutation::Update { delta, .. } => assert_eq!(delta.names().collect::<Vec<_>>(), ["text"]),
		other => panic!("Expected an update, got {:?}", other),
	}
	let ops = scheduler.host_mut().take_ops();
	assert!(matches!(&ops[..], [Op::Update(..)]), "{:?}", ops);
	assert_eq!(scheduler.host().markup(), "<div><p>a</p><p>c</p></div>");
}

#[test]
fn keyed_rotation_only_moves() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ul([li("A", "1"), li("B", "2"), li("C", "3")])));
	let before = top_children(&scheduler, root);

	let report = render(&mut scheduler, root, Some(ul([li("C", "3"), li("A", "1"), li("B", "2")])));

	assert!(report.mutations.iter().all(|mutation| matches!(mutation, Mutation::Move { .. })), "{:?}", report.mutations);
	assert_eq!(report.counts.moves, 1);
	assert_eq!(top_children(&scheduler, root), [before[2], before[0], before[1]]);
	assert_eq!(scheduler.host().markup(), "<ul><li>3</li><li>1</li><li>2</li></ul>");
}

#[test]
fn type_change_replaces() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(text("div", "content")));
	let old = scheduler.tree(root).unwrap().children(NodeId::ROOT)[0];
	scheduler.host_mut().take_ops();

	let report = render(&mut scheduler, root, Some(text("span", "content")));

	let new = scheduler.tree(root).unwrap().children(NodeId::ROOT)[0];
	assert_ne!(old, new);
	assert_eq!(
		report.mutations,
		[
			Mutation::Delete { node: old },
			Mutation::Create {
				parent: NodeId::ROOT,
				node: new,
				before: None
			}
		]
	);
	assert!(scheduler.tree(root).unwrap().get(old).is_none());
	assert_eq!(scheduler.host().count(|op| matches!(op, Op::Update(..))), 0);
	assert_eq!(scheduler.host().markup(), "<span>content</span>");
}

#[test]
fn reconciling_twice_is_idempotent() {
	let (mut scheduler, root) = scheduler();
	let element = ElementDescriptor::host("div").prop("class", "list").children([ul([li("a", "x"), li("b", "y")]), text("p", "footer")]);
	render(&mut scheduler, root, Some(element.clone()));
	scheduler.host_mut().take_ops();

	let report = render(&mut scheduler, root, Some(element));

	assert!(report.mutations.is_empty(), "{:?}", report.mutations);
	assert!(report.effects.is_empty(), "{:?}", report.effects);
	assert!(scheduler.host().ops.is_empty());
}

#[test]
fn keyed_list_end_to_end() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ElementDescriptor::host("div").child(ul([li("a", "X"), li("b", "Y")]))));
	let tree = scheduler.tree(root).unwrap();
	let list = tree.children(tree.children(NodeId::ROOT)[0])[0];
	let (a, b) = (tree.children(list)[0], tree.children(list)[1]);
	let b_text = tree.children(b)[0];

	let report = render(&mut scheduler, root, Some(ElementDescriptor::host("div").child(ul([li("b", "Y2"), li("a", "X")]))));

	assert_eq!(report.counts.update, 1);
	assert_eq!(report.counts.moves, 1);
	assert_eq!(report.counts.total(), 2);
	match &report.mutations[..] {
		[Mutation::Move { parent, node, index: 0 }, Mutation::Update { node: updated, .. }] => {
			assert_eq!((*parent, *node), (list, b));
			assert_eq!(*updated, b_text);
		}
		other => panic!("Unexpected records: {:?}", other),
	}
	assert_eq!(scheduler.tree(root).unwrap().children(list), [b, a]);
	assert_eq!(scheduler.host().markup(), "<div><ul><li>Y2</li><li>X</li></ul></div>");
}

#[test]
fn insertion_in_the_middle_keeps_identities() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ul([li("a", "1"), li("b", "2")])));
	let before = top_children(&scheduler, root);

	let report = render(&mut scheduler, root, Some(ul([li("a", "1"), li("x", "new"), li("b", "2")])));

	let after = top_children(&scheduler, root);
	assert_eq!((after[0], after[2]), (before[0], before[1]));
	let list = scheduler.tree(root).unwrap().children(NodeId::ROOT)[0];
	assert_eq!(
		report.mutations,
		[Mutation::Create {
			parent: list,
			node: after[1],
			before: Some(before[1]),
		}]
	);
	assert_eq!(scheduler.host().markup(), "<ul><li>1</li><li>new</li><li>2</li></ul>");
}

#[test]
fn creations_anchor_on_siblings_that_stay() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ElementDescriptor::host("ul")));

	let report = render(&mut scheduler, root, Some(ul([li("a", "1"), li("b", "2")])));
	let list = scheduler.tree(root).unwrap().children(NodeId::ROOT)[0];
	let items = top_children(&scheduler, root);
	assert_eq!(
		report.mutations,
		[
			Mutation::Create { parent: list, node: items[0], before: None },
			Mutation::Create { parent: list, node: items[1], before: None },
		]
	);

	// "a" stays and "b" moves in front of it, so "x" anchors on "a" rather than on its next sibling.
	let report = render(&mut scheduler, root, Some(ul([li("x", "new"), li("b", "2"), li("a", "1")])));
	let after = top_children(&scheduler, root);
	assert_eq!(
		report.mutations,
		[
			Mutation::Create {
				parent: list,
				node: after[0],
				before: Some(items[0]),
			},
			Mutation::Move { parent: list, node: items[1], index: 1 },
		]
	);
	assert_eq!(scheduler.host().markup(), "<ul><li>new</li><li>2</li><li>1</li></ul>");
}

#[test]
fn removal_unmounts_the_whole_subtree() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ul([li("a", "1"), li("b", "2"), li("c", "3")])));
	let before = top_children(&scheduler, root);
	let b_text = scheduler.tree(root).unwrap().children(before[1])[0];

	let report = render(&mut scheduler, root, Some(ul([li("a", "1"), li("c", "3")])));

	assert_eq!(report.mutations, [Mutation::Delete { node: before[1] }]);
	let unmounted: Vec<_> = report.effects.iter().filter(|effect| effect.phase == EffectPhase::Unmount).map(|effect| effect.node).collect();
	assert_eq!(unmounted, [b_text, before[1]]);
	assert!(scheduler.tree(root).unwrap().get(before[1]).is_none());
	assert!(scheduler.tree(root).unwrap().get(b_text).is_none());
	assert_eq!(scheduler.host().markup(), "<ul><li>1</li><li>3</li></ul>");
}

#[test]
fn keyless_children_match_by_position() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ElementDescriptor::host("div").children([text("p", "a"), text("p", "b")])));
	let before = top_children(&scheduler, root);

	let report = render(&mut scheduler, root, Some(ElementDescriptor::host("div").children([ElementDescriptor::host("span"), text("p", "b")])));

	let after = top_children(&scheduler, root);
	assert_eq!(after[1], before[1]);
	let div = scheduler.tree(root).unwrap().children(NodeId::ROOT)[0];
	assert_eq!(
		report.mutations,
		[
			Mutation::Delete { node: before[0] },
			Mutation::Create {
				parent: div,
				node: after[0],
				before: Some(before[1]),
			}
		]
	);
	assert_eq!(scheduler.host().markup(), "<div><span></span><p>b</p></div>");
}

#[test]
fn duplicate_key_pair_keeps_the_last_one_keyed() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ul([li("k", "1"), li("k", "2")])));
	let before = top_children(&scheduler, root);
	let tree = scheduler.tree(root).unwrap();
	assert_eq!(tree.get(before[0]).unwrap().key, None);
	assert_eq!(tree.get(before[1]).unwrap().key, Some(Key::from("k")));
	assert_eq!(scheduler.host().markup(), "<ul><li>1</li><li>2</li></ul>");

	let report = render(&mut scheduler, root, Some(ul([li("k", "one"), li("k", "two")])));

	assert_eq!(top_children(&scheduler, root), before);
	assert_eq!(report.counts.update, 2);
	assert_eq!(report.counts.total(), 2);
	assert!(report.conflicts.is_empty());
	assert_eq!(scheduler.host().markup(), "<ul><li>one</li><li>two</li></ul>");
}

#[test]
fn three_shared_keys_keep_the_previous_children() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ElementDescriptor::host("div").children([text("h1", "title"), ul([li("a", "1"), li("b", "2")])])));

	let report = render(
		&mut scheduler,
		root,
		Some(ElementDescriptor::host("div").children([text("h1", "new title"), ul([li("d", "x"), li("d", "y"), li("d", "z")])])),
	);

	assert_eq!(report.conflicts.len(), 1);
	assert_eq!(report.conflicts[0].key, Key::from("d"));
	assert_eq!(report.conflicts[0].occurrences, 3);
	assert!(matches!(report.check(), Err(EngineError::DuplicateKeyConflict(_))));
	assert_eq!(scheduler.host().markup(), "<div><h1>new title</h1><ul><li>1</li><li>2</li></ul></div>");
}

#[test]
fn clearing_the_root_removes_everything() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ul([li("a", "1")])));
	let list = scheduler.tree(root).unwrap().children(NodeId::ROOT)[0];

	let report = render(&mut scheduler, root, None);

	assert_eq!(report.mutations, [Mutation::Delete { node: list }]);
	assert_eq!(report.counts.delete, 1);
	assert_eq!(scheduler.tree(root).unwrap().len(), 1);
	assert_eq!(scheduler.host().markup(), "");
}

#[test]
fn components_render_their_children_in_place() {
	let (mut scheduler, root) = scheduler();
	let section = Component::new("Section", |_, children| Ok(vec![ElementDescriptor::host("section").child(text("h2", "untitled")).children(children.iter().cloned())]));
	let page = |paragraph: &str| ElementDescriptor::host("main").children([ElementDescriptor::component(&section).child(text("p", paragraph)), text("footer", "end")]);

	render(&mut scheduler, root, Some(page("first")));
	assert_eq!(scheduler.host().markup(), "<main><section><h2>untitled</h2><p>first</p></section><footer>end</footer></main>");
	scheduler.host_mut().take_ops();

	let report = render(&mut scheduler, root, Some(page("second")));

	assert_eq!(report.counts.update, 1);
	assert_eq!(report.counts.total(), 1);
	assert_eq!(scheduler.host().markup(), "<main><section><h2>untitled</h2><p>second</p></section><footer>end</footer></main>");
}

#[test]
fn components_are_replaced_with_all_their_hosts() {
	let (mut scheduler, root) = scheduler();
	let pair = Component::new("Pair", |_, _| Ok(vec![text("b", "1"), text("i", "2")]));
	render(&mut scheduler, root, Some(ElementDescriptor::host("p").children([ElementDescriptor::component(&pair), text("u", "3")])));
	assert_eq!(scheduler.host().markup(), "<p><b>1</b><i>2</i><u>3</u></p>");

	render(&mut scheduler, root, Some(ElementDescriptor::host("p").children([text("s", "0"), text("u", "3")])));

	assert_eq!(scheduler.host().markup(), "<p><s>0</s><u>3</u></p>");
}

#[test]
fn keyed_components_move_all_their_hosts() {
	let (mut scheduler, root) = scheduler();
	let pair = Component::new("Pair", |props, _| {
		let label = props.text().unwrap_or_default().to_owned();
		Ok(vec![text("b", &label), text("i", &label)])
	});
	let item = |key: &str| ElementDescriptor::component(&pair).key(key).prop("text", key);

	render(&mut scheduler, root, Some(ElementDescriptor::host("div").children([item("x"), item("y"), text("hr", "")])));
	assert_eq!(scheduler.host().markup(), "<div><b>x</b><i>x</i><b>y</b><i>y</i><hr></hr></div>");

	let report = render(&mut scheduler, root, Some(ElementDescriptor::host("div").children([item("y"), item("x"), text("hr", "")])));

	assert_eq!(report.counts.moves, 1);
	assert_eq!(scheduler.host().markup(), "<div><b>y</b><i>y</i><b>x</b><i>x</i><hr></hr></div>");
}

#[test]
fn pure_components_skip_unchanged_renders() {
	let (mut scheduler, root) = scheduler();
	let renders = Rc::new(Cell::new(0));
	let badge = Component::builder("Badge", {
		let renders = Rc::clone(&renders);
		move |props, _| {
			renders.set(renders.get() + 1);
			Ok(vec![text("span", props.text().unwrap_or_default())])
		}
	})
	.pure()
	.build();
	let page = |title: &str, count: &str| ElementDescriptor::host("div").children([text("h1", title), ElementDescriptor::component(&badge).prop("text", count)]);

	render(&mut scheduler, root, Some(page("a", "1")));
	render(&mut scheduler, root, Some(page("b", "1")));
	assert_eq!(renders.get(), 1);
	assert_eq!(scheduler.host().markup(), "<div><h1>b</h1><span>1</span></div>");

	render(&mut scheduler, root, Some(page("b", "2")));
	assert_eq!(renders.get(), 2);
	assert_eq!(scheduler.host().markup(), "<div><h1>b</h1><span>2</span></div>");
}

#[test]
fn tag_names_are_compared_exactly() {
	let (mut scheduler, root) = scheduler();
	render(&mut scheduler, root, Some(ElementDescriptor::host("DIV")));

	let report = render(&mut scheduler, root, Some(ElementDescriptor::host("div")));

	assert_eq!(report.counts.delete, 1);
	assert_eq!(report.counts.create, 1);
	assert_eq!(scheduler.host().markup(), "<div></div>");
}

#[test]
fn depth_limit_stops_descending() {
	init_log();
	let mut scheduler = Scheduler::new(RecordingHost::new(), EngineConfig::default().with_slice(SliceBudget::Unbounded).with_depth_limit(2));
	let root = scheduler.create_root(RecordingHost::CONTAINER);

	render(&mut scheduler, root, Some(ElementDescriptor::host("a").child(ElementDescriptor::host("b").child(ElementDescriptor::host("c").child(ElementDescriptor::host("d"))))));

	assert_eq!(scheduler.host().markup(), "<a><b><c></c></b></a>");
}
